//! Presentation pipeline traits.
//!
//! These mirror the browser media stack the streaming consumer drives: an
//! element that renders a source URL, a media source that accepts appended
//! segments, and a transmuxer that repackages raw live segments into an
//! appendable container. Hosts provide concrete implementations.

use crate::error::Result;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

/// Result of asking the element to start playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Playing,
    /// The host refused to start audible playback without a user gesture.
    AutoplayBlocked,
    /// The element cannot decode the bound resource.
    Unsupported,
}

/// The rendering element (a video tag in a browser host).
#[async_trait]
pub trait PresentationElement: Send + Sync {
    /// Binds a resource URL to the element.
    fn set_source(&self, url: &str) -> Result<()>;

    fn set_cross_origin(&self, value: &str);

    async fn play(&self) -> Result<PlayOutcome>;

    fn pause(&self);

    /// Replaces the element with a muted, autoplaying, looping one whose single
    /// `<source>` child points at `url`.
    fn rebuild_muted_loop(&self, url: &str, mime_type: &str) -> Result<()>;
}

/// Factory and capability probe for media sources.
pub trait MediaPipeline: Send + Sync {
    /// Whether the host can decode the given `mime; codecs="..."` string.
    fn is_type_supported(&self, mime_codecs: &str) -> bool;

    /// Creates a media source and a blob URL referencing it.
    fn create_media_source(&self) -> Result<Box<dyn MediaSource>>;

    /// Revokes a blob URL previously handed out by this pipeline or the module.
    fn revoke_object_url(&self, url: &str);
}

/// A media source accepting appended segments.
#[async_trait]
pub trait MediaSource: Send + Sync {
    fn object_url(&self) -> &str;

    /// Resolves once the source is attached to an element and open.
    async fn opened(&self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Adds a source buffer in sequence mode.
    fn add_source_buffer(&self, mime_codecs: &str) -> Result<Box<dyn SourceBuffer>>;

    /// Signals that no further segments will be appended.
    fn end_of_stream(&self) -> Result<()>;
}

/// Append side of a media source.
///
/// One append may be in progress at a time; [`SourceBuffer::ready`] resolves
/// once the buffer can accept more data.
#[async_trait]
pub trait SourceBuffer: Send + Sync {
    fn append(&mut self, data: Bytes) -> Result<()>;

    async fn ready(&mut self) -> Result<()>;

    fn is_updating(&self) -> bool;
}

/// One remuxed output unit: an initialization segment plus media data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmuxedSegment {
    pub init_segment: Bytes,
    pub data: Bytes,
}

impl TransmuxedSegment {
    /// Concatenates init segment and data into a single appendable buffer.
    pub fn into_appendable(self) -> Bytes {
        if self.init_segment.is_empty() {
            return self.data;
        }
        let mut buf = BytesMut::with_capacity(self.init_segment.len() + self.data.len());
        buf.extend_from_slice(&self.init_segment);
        buf.extend_from_slice(&self.data);
        buf.freeze()
    }
}

/// Repackages raw live segments into browser-appendable fragments.
pub trait Transmuxer: Send {
    /// Pushes one raw segment and flushes, returning every completed fragment.
    fn push(&mut self, data: &[u8]) -> Result<Vec<TransmuxedSegment>>;
}

/// Creates one transmuxer per live session.
pub trait TransmuxerFactory: Send + Sync {
    fn create(&self) -> Box<dyn Transmuxer>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appendable_concatenates_init_and_data() {
        let segment = TransmuxedSegment {
            init_segment: Bytes::from_static(b"init"),
            data: Bytes::from_static(b"data"),
        };
        assert_eq!(segment.into_appendable(), Bytes::from_static(b"initdata"));

        let bare = TransmuxedSegment {
            init_segment: Bytes::new(),
            data: Bytes::from_static(b"data"),
        };
        assert_eq!(bare.into_appendable(), Bytes::from_static(b"data"));
    }
}
