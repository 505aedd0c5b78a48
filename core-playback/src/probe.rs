//! # Container Probe
//!
//! Inspects the first segment of a non-live stream to decide whether it can
//! be appended to a media source as-is.
//!
//! ## Overview
//!
//! - **MP4** (`video/mp4`, `audio/mp4`): an ISO-BMFF box walk. The stream is
//!   fragmented when `moov/mvex` is present; codecs come from the `stsd`
//!   sample entries.
//! - **WebM** (`video/webm`, `audio/webm`): always fragmented; codecs come
//!   from `Segment/Tracks/TrackEntry/CodecID`.
//! - Anything else is reported as not fragmented.
//!
//! The probe never fails. Truncated or malformed input yields whatever was
//! parsed before the damage.

use std::fmt;

/// What the probe learned about a segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInfo {
    pub is_fragmented: bool,
    pub codecs: Vec<String>,
    /// `{mime}; codecs="{c1},{c2}"`, or the bare mime when no codec was found.
    pub mime_codecs: String,
}

impl ContainerInfo {
    fn new(mime_type: &str, is_fragmented: bool, codecs: Vec<String>) -> Self {
        let mime_codecs = if codecs.is_empty() {
            mime_type.to_string()
        } else {
            format!("{}; codecs=\"{}\"", mime_type, codecs.join(","))
        };
        Self {
            is_fragmented,
            codecs,
            mime_codecs,
        }
    }
}

impl fmt::Display for ContainerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.mime_codecs,
            if self.is_fragmented {
                "fragmented"
            } else {
                "progressive"
            }
        )
    }
}

/// Container metadata inspection for the first streamed segment.
pub trait ContainerProbe: Send + Sync {
    fn probe(&self, mime_type: &str, data: &[u8]) -> ContainerInfo;
}

/// Built-in MP4 and WebM probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContainerProbe;

impl ContainerProbe for DefaultContainerProbe {
    fn probe(&self, mime_type: &str, data: &[u8]) -> ContainerInfo {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "video/mp4" | "audio/mp4" => {
                let (fragmented, codecs) = mp4::probe(data);
                ContainerInfo::new(mime_type, fragmented, codecs)
            }
            "video/webm" | "audio/webm" => ContainerInfo::new(mime_type, true, webm::probe(data)),
            _ => ContainerInfo {
                is_fragmented: false,
                codecs: Vec::new(),
                mime_codecs: mime_type.to_string(),
            },
        }
    }
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
    data.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u64(data: &[u8], at: usize) -> Option<u64> {
    data.get(at..at + 8).map(|b| {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        u64::from_be_bytes(buf)
    })
}

// ============================================================================
// ISO-BMFF
// ============================================================================

mod mp4 {
    use super::{read_u16, read_u32, read_u64};

    /// Bytes between the start of a visual sample entry body and its child boxes.
    const VISUAL_ENTRY_HEADER: usize = 78;
    /// Same for audio sample entries (version 0).
    const AUDIO_ENTRY_HEADER: usize = 28;

    /// One parsed box: type and payload (clamped to the available data).
    struct Mp4Box<'a> {
        kind: [u8; 4],
        body: &'a [u8],
    }

    /// Iterates sibling boxes, stopping at the first malformed header.
    struct Boxes<'a> {
        data: &'a [u8],
        offset: usize,
    }

    fn boxes(data: &[u8]) -> Boxes<'_> {
        Boxes { data, offset: 0 }
    }

    impl<'a> Iterator for Boxes<'a> {
        type Item = Mp4Box<'a>;

        fn next(&mut self) -> Option<Self::Item> {
            let start = self.offset;
            let size32 = read_u32(self.data, start)?;
            let kind: [u8; 4] = self.data.get(start + 4..start + 8)?.try_into().ok()?;

            let (header, size) = match size32 {
                0 => (8usize, (self.data.len() - start) as u64),
                1 => (16usize, read_u64(self.data, start + 8)?),
                n => (8usize, u64::from(n)),
            };
            if size < header as u64 {
                return None;
            }

            let end = start
                .checked_add(usize::try_from(size).unwrap_or(usize::MAX))
                .unwrap_or(usize::MAX)
                .min(self.data.len());
            let body = self.data.get(start + header..end).unwrap_or_default();
            self.offset = if end > start { end } else { self.data.len() };
            Some(Mp4Box { kind, body })
        }
    }

    fn child<'a>(data: &'a [u8], kind: &[u8; 4]) -> Option<&'a [u8]> {
        boxes(data).find(|b| &b.kind == kind).map(|b| b.body)
    }

    pub(super) fn probe(data: &[u8]) -> (bool, Vec<String>) {
        let Some(moov) = child(data, b"moov") else {
            return (false, Vec::new());
        };

        let fragmented = child(moov, b"mvex").is_some();
        let mut codecs = Vec::new();

        for trak in boxes(moov).filter(|b| &b.kind == b"trak") {
            let stsd = child(trak.body, b"mdia")
                .and_then(|mdia| child(mdia, b"minf"))
                .and_then(|minf| child(minf, b"stbl"))
                .and_then(|stbl| child(stbl, b"stsd"));

            // version/flags + entry_count
            if let Some(entries) = stsd.and_then(|stsd| stsd.get(8..)) {
                for entry in boxes(entries) {
                    let codec = sample_entry_codec(&entry);
                    if !codecs.contains(&codec) {
                        codecs.push(codec);
                    }
                }
            }
        }

        (fragmented, codecs)
    }

    fn sample_entry_codec(entry: &Mp4Box<'_>) -> String {
        let fourcc = String::from_utf8_lossy(&entry.kind).into_owned();

        match &entry.kind {
            b"avc1" | b"avc3" => entry
                .body
                .get(VISUAL_ENTRY_HEADER..)
                .and_then(|children| child(children, b"avcC"))
                .and_then(|avcc| avcc.get(1..4))
                .map(|pcl| format!("{}.{:02x}{:02x}{:02x}", fourcc, pcl[0], pcl[1], pcl[2]))
                .unwrap_or(fourcc),
            b"mp4a" => entry
                .body
                .get(AUDIO_ENTRY_HEADER..)
                .and_then(|children| child(children, b"esds"))
                .and_then(esds_codec)
                .unwrap_or(fourcc),
            _ => fourcc,
        }
    }

    /// Reads an MPEG-4 descriptor header, returning (tag, body).
    fn descriptor(data: &[u8]) -> Option<(u8, &[u8], usize)> {
        let tag = *data.first()?;
        let mut len = 0usize;
        let mut at = 1;
        for _ in 0..4 {
            let byte = *data.get(at)?;
            at += 1;
            len = (len << 7) | usize::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                break;
            }
        }
        let end = at.saturating_add(len).min(data.len());
        Some((tag, &data[at..end], end))
    }

    /// `mp4a.OO.A` from an `esds` payload.
    fn esds_codec(esds: &[u8]) -> Option<String> {
        // version/flags
        let (tag, es, _) = descriptor(esds.get(4..)?)?;
        if tag != 0x03 {
            return None;
        }

        let flags = *es.get(2)?;
        let mut at = 3;
        if flags & 0x80 != 0 {
            at += 2;
        }
        if flags & 0x40 != 0 {
            at += 1 + usize::from(*es.get(at)?);
        }
        if flags & 0x20 != 0 {
            at += 2;
        }

        let (tag, config, _) = descriptor(es.get(at..)?)?;
        if tag != 0x04 {
            return None;
        }
        let object_type = *config.first()?;

        // objectType(1) streamType(1) bufferSize(3) maxBitrate(4) avgBitrate(4)
        let audio_object_type = config
            .get(13..)
            .and_then(descriptor)
            .filter(|(tag, _, _)| *tag == 0x05)
            .and_then(|(_, specific, _)| {
                let first = read_u16(specific, 0)
                    .map(|v| v >> 11)
                    .or_else(|| specific.first().map(|b| u16::from(b >> 3)))?;
                if first == 31 {
                    let bits = read_u16(specific, 0)?;
                    Some(32 + ((bits >> 5) & 0x3f))
                } else {
                    Some(first)
                }
            });

        Some(match audio_object_type {
            Some(aot) => format!("mp4a.{:02x}.{}", object_type, aot),
            None => format!("mp4a.{:02x}", object_type),
        })
    }
}

// ============================================================================
// WebM (EBML)
// ============================================================================

mod webm {
    const SEGMENT: u32 = 0x1853_8067;
    const TRACKS: u32 = 0x1654_AE6B;
    const TRACK_ENTRY: u32 = 0xAE;
    const CODEC_ID: u32 = 0x86;

    struct Element<'a> {
        id: u32,
        body: &'a [u8],
    }

    /// Element ID with its length marker kept, as the registry lists them.
    fn element_id(data: &[u8]) -> Option<(u32, usize)> {
        let first = *data.first()?;
        let len = first.leading_zeros() as usize + 1;
        if len > 4 {
            return None;
        }
        let bytes = data.get(..len)?;
        let id = bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
        Some((id, len))
    }

    /// Data size with its marker removed. `None` in the value means unknown size.
    fn data_size(data: &[u8]) -> Option<(Option<u64>, usize)> {
        let first = *data.first()?;
        let len = first.leading_zeros() as usize + 1;
        if len > 8 {
            return None;
        }
        let bytes = data.get(..len)?;
        let mask = if len == 8 { 0 } else { 0xffu8 >> len };
        let mut value = u64::from(first & mask);
        let mut all_ones = first & mask == mask;
        for b in &bytes[1..] {
            value = (value << 8) | u64::from(*b);
            all_ones &= *b == 0xff;
        }
        Some(((!all_ones).then_some(value), len))
    }

    struct Elements<'a> {
        data: &'a [u8],
        offset: usize,
    }

    impl<'a> Iterator for Elements<'a> {
        type Item = Element<'a>;

        fn next(&mut self) -> Option<Self::Item> {
            let rest = self.data.get(self.offset..)?;
            let (id, id_len) = element_id(rest)?;
            let (size, size_len) = data_size(rest.get(id_len..)?)?;

            let start = id_len + size_len;
            let end = match size {
                Some(size) => start
                    .saturating_add(usize::try_from(size).unwrap_or(usize::MAX))
                    .min(rest.len()),
                None => rest.len(),
            };
            let body = rest.get(start..end).unwrap_or_default();
            self.offset += end;
            Some(Element { id, body })
        }
    }

    fn elements(data: &[u8]) -> Elements<'_> {
        Elements { data, offset: 0 }
    }

    pub(super) fn normalize(codec_id: &str) -> String {
        let trimmed = codec_id.trim_end_matches('\0');
        let stripped = match trimmed.strip_prefix("V_") {
            Some(rest) => rest.to_string(),
            None => trimmed.replacen("A_", "", 1),
        };
        stripped.to_lowercase()
    }

    pub(super) fn probe(data: &[u8]) -> Vec<String> {
        let mut codecs = Vec::new();

        for segment in elements(data).filter(|e| e.id == SEGMENT) {
            for tracks in elements(segment.body).filter(|e| e.id == TRACKS) {
                for entry in elements(tracks.body).filter(|e| e.id == TRACK_ENTRY) {
                    if let Some(codec_id) = elements(entry.body).find(|e| e.id == CODEC_ID) {
                        let codec = normalize(&String::from_utf8_lossy(codec_id.body));
                        if !codec.is_empty() && !codecs.contains(&codec) {
                            codecs.push(codec);
                        }
                    }
                }
            }
        }

        codecs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn mp4_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32((body.len() + 8) as u32);
        buf.extend_from_slice(kind);
        buf.extend_from_slice(body);
        buf.to_vec()
    }

    fn avc1_entry() -> Vec<u8> {
        let mut body = vec![0u8; 78];
        body.extend(mp4_box(b"avcC", &[0x01, 0x64, 0x00, 0x1f, 0xff]));
        mp4_box(b"avc1", &body)
    }

    fn mp4a_entry() -> Vec<u8> {
        let mut esds = vec![0u8; 4];
        // ES_Descriptor
        let mut es = vec![0x00, 0x01, 0x00];
        let mut dcd = vec![0x40, 0x15];
        dcd.extend_from_slice(&[0u8; 11]);
        dcd.extend_from_slice(&[0x05, 0x02, 0x12, 0x10]);
        es.push(0x04);
        es.push(dcd.len() as u8);
        es.extend(dcd);
        esds.push(0x03);
        esds.extend_from_slice(&[0x80, 0x80, 0x80, es.len() as u8]);
        esds.extend(es);

        let mut body = vec![0u8; 28];
        body.extend(mp4_box(b"esds", &esds));
        mp4_box(b"mp4a", &body)
    }

    fn trak(entry: Vec<u8>) -> Vec<u8> {
        let mut stsd = vec![0, 0, 0, 0, 0, 0, 0, 1];
        stsd.extend(entry);
        let stbl = mp4_box(b"stbl", &mp4_box(b"stsd", &stsd));
        let minf = mp4_box(b"minf", &stbl);
        let mdia = mp4_box(b"mdia", &minf);
        mp4_box(b"trak", &mdia)
    }

    fn mp4_init(fragmented: bool) -> Vec<u8> {
        let mut moov = mp4_box(b"mvhd", &[0u8; 100]);
        moov.extend(trak(avc1_entry()));
        moov.extend(trak(mp4a_entry()));
        if fragmented {
            moov.extend(mp4_box(b"mvex", &mp4_box(b"trex", &[0u8; 24])));
        }
        let mut file = mp4_box(b"ftyp", b"isomiso2");
        file.extend(mp4_box(b"moov", &moov));
        file
    }

    #[test]
    fn test_fragmented_mp4() {
        let info = DefaultContainerProbe.probe("video/mp4", &mp4_init(true));
        assert!(info.is_fragmented);
        assert_eq!(info.codecs, vec!["avc1.64001f", "mp4a.40.2"]);
        assert_eq!(info.mime_codecs, "video/mp4; codecs=\"avc1.64001f,mp4a.40.2\"");
    }

    #[test]
    fn test_progressive_mp4() {
        let info = DefaultContainerProbe.probe("video/mp4", &mp4_init(false));
        assert!(!info.is_fragmented);
        assert_eq!(info.codecs.len(), 2);
    }

    #[test]
    fn test_truncated_mp4_is_tolerated() {
        let data = mp4_init(true);
        let info = DefaultContainerProbe.probe("video/mp4", &data[..40]);
        assert!(!info.is_fragmented);
        assert_eq!(info.mime_codecs, "video/mp4");
    }

    #[test]
    fn test_large_size_header() {
        let moov_body = mp4_box(b"mvex", &[]);
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(b"moov");
        data.extend_from_slice(&((moov_body.len() + 16) as u64).to_be_bytes());
        data.extend(moov_body);
        assert!(DefaultContainerProbe.probe("audio/mp4", &data).is_fragmented);
    }

    fn ebml(id: &[u8], body: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.push(0x80 | body.len() as u8);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_webm_codecs() {
        let video = ebml(&[0xAE], &ebml(&[0x86], b"V_VP9"));
        let audio = ebml(&[0xAE], &ebml(&[0x86], b"A_OPUS"));
        let mut tracks_body = video;
        tracks_body.extend(audio);
        let tracks = ebml(&[0x16, 0x54, 0xAE, 0x6B], &tracks_body);

        // Segment with unknown size
        let mut data = ebml(&[0x1A, 0x45, 0xDF, 0xA3], &[0x42, 0x82, 0x84, b'w', b'e', b'b', b'm']);
        data.extend_from_slice(&[0x18, 0x53, 0x80, 0x67, 0x01, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
        data.extend(tracks);

        let info = DefaultContainerProbe.probe("video/webm", &data);
        assert!(info.is_fragmented);
        assert_eq!(info.codecs, vec!["vp9", "opus"]);
        assert_eq!(info.mime_codecs, "video/webm; codecs=\"vp9,opus\"");
    }

    #[test]
    fn test_webm_codec_normalization() {
        assert_eq!(webm::normalize("V_MPEG4/ISO/AVC"), "mpeg4/iso/avc");
        assert_eq!(webm::normalize("A_VORBIS"), "vorbis");
    }

    #[test]
    fn test_other_mime_not_fragmented() {
        let info = DefaultContainerProbe.probe("video/x-matroska", b"anything");
        assert!(!info.is_fragmented);
        assert_eq!(info.mime_codecs, "video/x-matroska");
        assert!(info.codecs.is_empty());
    }
}
