//! # Playback & Streaming Module
//!
//! Streams MP3 audio from a local file, an HTTP server or memory into a
//! host audio sink.
//!
//! ## Overview
//!
//! This module handles:
//! - Frame sources (local file, ranged HTTP with read-ahead, in-memory)
//! - MP3 frame scanning and the sample-to-file seek index
//! - Random-access decoding with decoder warm-up after seeks
//! - A ring-buffered PCM store the sink pulls from
//! - The buffering state machine driving the sink from buffer fill level
//!
//! ## Pipeline
//!
//! ```text
//! FrameSource -> FrameScanner/SeekIndex -> SeekableDecodedStream
//!     -> FrameDecompressor -> BufferedSampleStore -> AudioSink
//! ```

pub mod clock;
pub mod config;
pub mod decoded_stream;
pub mod decoder;
pub mod error;
pub mod events;
pub mod frame;
pub mod ring_buffer;
pub mod sample_store;
pub mod scanner;
pub mod seek_index;
pub mod source;
pub mod streaming;

pub use clock::PlaybackClock;
pub use config::{IndexMode, PlaybackState, StreamingConfig, StreamingStats};
pub use decoded_stream::{DecodedStreamOptions, SeekableDecodedStream, SharedDecodedStream};
pub use decoder::{DecompressorFactory, FrameDecompressor};
pub use error::{PlaybackError, Result};
pub use events::PlaybackEvent;
pub use frame::{ChannelMode, FrameHeader, Mp3Format, Mp3Frame, MpegVersion, XingHeader};
pub use ring_buffer::CircularBuffer;
pub use sample_store::BufferedSampleStore;
pub use scanner::{FrameScanner, StreamInfo};
pub use seek_index::{SeekIndex, SeekIndexEntry};
pub use source::{
    open_source, FileSource, FrameSource, MediaLocation, MemorySource, PartialHttpSource,
    SourceOptions,
};
pub use streaming::StreamingController;
