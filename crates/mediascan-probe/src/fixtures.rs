//! Byte builders for minimal, well-formed container files.
//!
//! Each builder produces just enough structure for the parsers in this
//! crate to recover format, codec, dimensions and duration.

fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(&(payload.len() as u32 + 8).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

fn mp4_container(kind: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    mp4_box(kind, &children.concat())
}

/// `mvhd` / `mdhd` version 0 payload of `len` bytes.
fn media_header(timescale: u32, duration: u32, len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    data[12..16].copy_from_slice(&timescale.to_be_bytes());
    data[16..20].copy_from_slice(&duration.to_be_bytes());
    data
}

fn mp4_trak(
    handler: &[u8; 4],
    fourcc: &[u8; 4],
    width: u16,
    height: u16,
    timescale: u32,
    duration: u32,
) -> Vec<u8> {
    let mut tkhd = vec![0u8; 84];
    tkhd[76..80].copy_from_slice(&((width as u32) << 16).to_be_bytes());
    tkhd[80..84].copy_from_slice(&((height as u32) << 16).to_be_bytes());

    let mut hdlr = vec![0u8; 25];
    hdlr[8..12].copy_from_slice(handler);

    let mut entry = vec![0u8; 6];
    entry.extend_from_slice(&1u16.to_be_bytes());
    if handler == b"vide" {
        entry.extend_from_slice(&[0u8; 16]);
        entry.extend_from_slice(&width.to_be_bytes());
        entry.extend_from_slice(&height.to_be_bytes());
        entry.extend_from_slice(&[0u8; 50]);
    } else {
        entry.extend_from_slice(&[0u8; 8]);
        entry.extend_from_slice(&2u16.to_be_bytes());
        entry.extend_from_slice(&16u16.to_be_bytes());
        entry.extend_from_slice(&[0u8; 4]);
        entry.extend_from_slice(&(timescale << 16).to_be_bytes());
    }
    let mut stsd = vec![0, 0, 0, 0];
    stsd.extend_from_slice(&1u32.to_be_bytes());
    stsd.extend_from_slice(&mp4_box(fourcc, &entry));

    let stbl = mp4_container(b"stbl", &[mp4_box(b"stsd", &stsd)]);
    let minf = mp4_container(b"minf", &[stbl]);
    let mdia = mp4_container(
        b"mdia",
        &[
            mp4_box(b"mdhd", &media_header(timescale, duration, 24)),
            mp4_box(b"hdlr", &hdlr),
            minf,
        ],
    );
    mp4_container(b"trak", &[mp4_box(b"tkhd", &tkhd), mdia])
}

fn mp4_file(brand: &[u8; 4], seconds: f64, traks: Vec<Vec<u8>>) -> Vec<u8> {
    let mut ftyp = brand.to_vec();
    ftyp.extend_from_slice(&0u32.to_be_bytes());
    ftyp.extend_from_slice(brand);

    let mut moov = vec![mp4_box(b"mvhd", &media_header(1000, (seconds * 1000.0) as u32, 100))];
    moov.extend(traks);

    let mut out = mp4_box(b"ftyp", &ftyp);
    out.extend_from_slice(&mp4_container(b"moov", &moov));
    out.extend_from_slice(&mp4_box(b"mdat", &[0u8; 16]));
    out
}

/// MP4 with an H.264 video track and an AAC audio track.
pub fn mp4_video(width: u16, height: u16, seconds: f64) -> Vec<u8> {
    let video = mp4_trak(b"vide", b"avc1", width, height, 1000, (seconds * 1000.0) as u32);
    let audio = mp4_trak(b"soun", b"mp4a", 0, 0, 48_000, (seconds * 48_000.0) as u32);
    mp4_file(b"isom", seconds, vec![video, audio])
}

/// MP4 with a single AAC audio track.
pub fn mp4_audio(seconds: f64) -> Vec<u8> {
    let audio = mp4_trak(b"soun", b"mp4a", 0, 0, 44_100, (seconds * 44_100.0) as u32);
    mp4_file(b"M4A ", seconds, vec![audio])
}

fn ebml_size(len: usize) -> Vec<u8> {
    if len < 0x7F {
        vec![0x80 | len as u8]
    } else if len < 0x3FFF {
        vec![0x40 | (len >> 8) as u8, len as u8]
    } else {
        let mut out = vec![0x01];
        out.extend_from_slice(&(len as u64).to_be_bytes()[1..]);
        out
    }
}

fn ebml(id: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&ebml_size(payload.len()));
    out.extend_from_slice(payload);
    out
}

/// Matroska file with an HEVC video track and an AAC audio track.
///
/// `doc_type` is written to the EBML header (`matroska` or `webm`).
pub fn matroska(doc_type: &str, width: u16, height: u16, seconds: f64) -> Vec<u8> {
    let header = [
        ebml(&[0x42, 0x86], &[1]),
        ebml(&[0x42, 0xF7], &[1]),
        ebml(&[0x42, 0xF2], &[4]),
        ebml(&[0x42, 0xF3], &[8]),
        ebml(&[0x42, 0x82], doc_type.as_bytes()),
    ]
    .concat();

    let info = ebml(
        &[0x15, 0x49, 0xA9, 0x66],
        &[
            ebml(&[0x2A, 0xD7, 0xB1], &[0x0F, 0x42, 0x40]),
            ebml(&[0x44, 0x89], &(seconds * 1000.0).to_be_bytes()),
        ]
        .concat(),
    );

    let video = ebml(
        &[0xAE],
        &[
            ebml(&[0xD7], &[1]),
            ebml(&[0x83], &[1]),
            ebml(&[0x86], b"V_MPEGH/ISO/HEVC"),
            ebml(
                &[0xE0],
                &[
                    ebml(&[0xB0], &width.to_be_bytes()),
                    ebml(&[0xBA], &height.to_be_bytes()),
                ]
                .concat(),
            ),
        ]
        .concat(),
    );
    let audio = ebml(
        &[0xAE],
        &[ebml(&[0xD7], &[2]), ebml(&[0x83], &[2]), ebml(&[0x86], b"A_AAC")].concat(),
    );
    let tracks = ebml(&[0x16, 0x54, 0xAE, 0x6B], &[video, audio].concat());
    let cluster = ebml(&[0x1F, 0x43, 0xB6, 0x75], &ebml(&[0xE7], &[0]));

    let mut out = ebml(&[0x1A, 0x45, 0xDF, 0xA3], &header);
    out.extend_from_slice(&ebml(&[0x18, 0x53, 0x80, 0x67], &[info, tracks, cluster].concat()));
    out
}

/// PCM WAV file with `data_len` bytes of silence.
pub fn wav(rate: u32, channels: u16, bits: u16, data_len: u32) -> Vec<u8> {
    let block_align = channels * bits / 8;
    let mut fmt = Vec::with_capacity(16);
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&channels.to_le_bytes());
    fmt.extend_from_slice(&rate.to_le_bytes());
    fmt.extend_from_slice(&(rate * block_align as u32).to_le_bytes());
    fmt.extend_from_slice(&block_align.to_le_bytes());
    fmt.extend_from_slice(&bits.to_le_bytes());

    let mut body = b"WAVE".to_vec();
    body.extend_from_slice(&riff_chunk(b"fmt ", &fmt));
    body.extend_from_slice(b"data");
    body.extend_from_slice(&data_len.to_le_bytes());
    body.resize(body.len() + data_len as usize, 0);

    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

fn riff_chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn riff_list(kind: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = kind.to_vec();
    payload.extend_from_slice(&children.concat());
    riff_chunk(b"LIST", &payload)
}

/// AVI with one video stream and one MP3 audio stream.
pub fn avi(
    fourcc: [u8; 4],
    width: u32,
    height: u32,
    micros_per_frame: u32,
    frames: u32,
) -> Vec<u8> {
    let mut avih = vec![0u8; 56];
    avih[0..4].copy_from_slice(&micros_per_frame.to_le_bytes());
    avih[16..20].copy_from_slice(&frames.to_le_bytes());
    avih[24..28].copy_from_slice(&2u32.to_le_bytes());
    avih[32..36].copy_from_slice(&width.to_le_bytes());
    avih[36..40].copy_from_slice(&height.to_le_bytes());

    let mut video_strh = vec![0u8; 56];
    video_strh[0..4].copy_from_slice(b"vids");
    video_strh[4..8].copy_from_slice(&fourcc);
    let mut bitmap = vec![0u8; 40];
    bitmap[0..4].copy_from_slice(&40u32.to_le_bytes());
    bitmap[4..8].copy_from_slice(&width.to_le_bytes());
    bitmap[8..12].copy_from_slice(&height.to_le_bytes());
    bitmap[16..20].copy_from_slice(&fourcc);

    let mut audio_strh = vec![0u8; 56];
    audio_strh[0..4].copy_from_slice(b"auds");
    let mut wave = Vec::with_capacity(18);
    wave.extend_from_slice(&0x55u16.to_le_bytes());
    wave.extend_from_slice(&2u16.to_le_bytes());
    wave.extend_from_slice(&44_100u32.to_le_bytes());
    wave.extend_from_slice(&16_000u32.to_le_bytes());
    wave.extend_from_slice(&[1, 0, 0, 0, 0, 0]);

    let hdrl = riff_list(
        b"hdrl",
        &[
            riff_chunk(b"avih", &avih),
            riff_list(b"strl", &[riff_chunk(b"strh", &video_strh), riff_chunk(b"strf", &bitmap)]),
            riff_list(b"strl", &[riff_chunk(b"strh", &audio_strh), riff_chunk(b"strf", &wave)]),
        ],
    );
    let movi = riff_list(b"movi", &[riff_chunk(b"00dc", &[0u8; 8])]);

    let mut body = b"AVI ".to_vec();
    body.extend_from_slice(&hdrl);
    body.extend_from_slice(&movi);

    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// FLAC STREAMINFO block payload.
fn streaminfo(rate: u32, total_samples: u64) -> Vec<u8> {
    let mut block = Vec::with_capacity(34);
    block.extend_from_slice(&4096u16.to_be_bytes());
    block.extend_from_slice(&4096u16.to_be_bytes());
    block.extend_from_slice(&[0u8; 6]);
    // stereo, 16 bits per sample
    let packed = ((rate as u64) << 44) | (1 << 41) | (15 << 36) | (total_samples & 0xF_FFFF_FFFF);
    block.extend_from_slice(&packed.to_be_bytes());
    block.extend_from_slice(&[0u8; 16]);
    block
}

/// Native FLAC stream with a single STREAMINFO block.
pub fn flac(rate: u32, total_samples: u64) -> Vec<u8> {
    let mut out = b"fLaC".to_vec();
    out.extend_from_slice(&[0x80, 0, 0, 34]);
    out.extend_from_slice(&streaminfo(rate, total_samples));
    out.extend_from_slice(&[0xFF, 0xF8, 0, 0]);
    out
}

/// A single Ogg page carrying `payload` as one packet.
pub fn ogg_page(serial: u32, granule: i64, payload: &[u8]) -> Vec<u8> {
    let mut lacing = vec![255u8; payload.len() / 255];
    lacing.push((payload.len() % 255) as u8);

    let mut out = b"OggS".to_vec();
    out.push(0);
    out.push(0);
    out.extend_from_slice(&granule.to_le_bytes());
    out.extend_from_slice(&serial.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(lacing.len() as u8);
    out.extend_from_slice(&lacing);
    out.extend_from_slice(payload);
    out
}

/// Ogg Vorbis stream whose last page ends at `final_granule` samples.
pub fn ogg_vorbis(rate: u32, final_granule: i64) -> Vec<u8> {
    let mut ident = b"\x01vorbis".to_vec();
    ident.extend_from_slice(&0u32.to_le_bytes());
    ident.push(2);
    ident.extend_from_slice(&rate.to_le_bytes());
    ident.extend_from_slice(&[0u8; 12]);
    ident.extend_from_slice(&[0xB8, 0x01]);

    let mut out = ogg_page(1, 0, &ident);
    out.extend_from_slice(&ogg_page(1, final_granule, &[0u8; 100]));
    out
}

/// Ogg Opus stream with the given pre-skip and final granule.
pub fn ogg_opus(pre_skip: u16, final_granule: i64) -> Vec<u8> {
    let mut head = b"OpusHead".to_vec();
    head.push(1);
    head.push(2);
    head.extend_from_slice(&pre_skip.to_le_bytes());
    head.extend_from_slice(&48_000u32.to_le_bytes());
    head.extend_from_slice(&[0, 0, 0]);

    let mut out = ogg_page(5, 0, &head);
    out.extend_from_slice(&ogg_page(5, final_granule, &[0u8; 100]));
    out
}

/// Constant-bitrate MPEG-1 layer III stream: 128 kbps, 44.1 kHz,
/// 417-byte frames, with an optional trailing ID3v1 tag.
pub fn mp3_cbr(frames: usize, id3v1: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(frames * 417 + 128);
    for _ in 0..frames {
        out.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        out.extend_from_slice(&[0u8; 413]);
    }
    if id3v1 {
        out.extend_from_slice(b"TAG");
        out.extend_from_slice(&[0u8; 125]);
    }
    out
}
