//! Audio decoder using symphonia
//!
//! Opens any format symphonia can probe and exposes it through the
//! [`Decoder`] trait: the stream format, an info dictionary keyed like
//! [`crate::metadata::keys`], the first embedded picture, and interleaved
//! 32-bit PCM reads bounded by the caller's buffer.

use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder as CodecDecoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey, Value};
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::audio::types::{CodecId, PcmBuffer, RawTagValue, RawTags, StreamFormat};
use crate::bit_depth::lossless_flags_for_bits;
use crate::error::{Error, Result};
use crate::metadata::keys;

/// An opened source
///
/// Closing is tied to drop.
pub trait Decoder: Send {
    /// Stream format of the audio track
    fn format(&self) -> &StreamFormat;

    /// Source bit depth as reported by the decoder (0 = unknown)
    fn bit_depth(&self) -> Result<u32>;

    /// Raw tag dictionary
    fn info_dictionary(&self) -> RawTags;

    /// Embedded artwork; only the first picture is exposed
    fn artwork(&self) -> Option<Vec<u8>>;

    /// Fill `buffer` after its current frames, returning the number of frames added.
    ///
    /// Returns 0 at end of stream.
    fn read(&mut self, buffer: &mut PcmBuffer) -> Result<usize>;
}

/// Opens decoders for source paths
pub trait DecoderFactory: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>>;
}

/// Factory for [`SymphoniaDecoder`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoderFactory;

impl DecoderFactory for SymphoniaDecoderFactory {
    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>> {
        Ok(Box::new(SymphoniaDecoder::open(path)?))
    }
}

/// Decoder backed by a symphonia format reader
pub struct SymphoniaDecoder {
    packets: PacketSource,
    format: StreamFormat,
    reported_bit_depth: u32,
    tags: RawTags,
    artwork: Option<Vec<u8>>,
    pending: PendingSamples,
}

/// Demuxer plus codec for the selected track
struct PacketSource {
    path: PathBuf,
    reader: Box<dyn FormatReader>,
    codec: Box<dyn CodecDecoder>,
    track_id: u32,
    sample_buf: Option<SampleBuffer<i32>>,
}

/// Decoded samples not yet handed out.
///
/// A decode failure that happens after some frames were already copied
/// into the caller's buffer is held back and reported by the next read.
#[derive(Debug, Default)]
struct PendingSamples {
    samples: VecDeque<i32>,
    exhausted: bool,
    error: Option<Error>,
}

impl PendingSamples {
    /// Fill `buffer` from queued samples, calling `decode` whenever fewer
    /// than one frame is queued. `decode` returns false at end of stream.
    fn fill<F>(&mut self, buffer: &mut PcmBuffer, mut decode: F) -> Result<usize>
    where
        F: FnMut(&mut VecDeque<i32>) -> Result<bool>,
    {
        let channels = buffer.channels() as usize;
        if channels == 0 {
            return Ok(0);
        }

        let mut frames_read = 0;
        while !buffer.is_full() {
            if self.samples.len() < channels {
                if let Some(e) = self.error.take() {
                    return Err(e);
                }
                if self.exhausted {
                    break;
                }
                match decode(&mut self.samples) {
                    Ok(true) => continue,
                    Ok(false) => {
                        self.exhausted = true;
                        break;
                    }
                    Err(e) if frames_read > 0 => {
                        self.error = Some(e);
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }

            let wanted = buffer.remaining_frames().min(self.samples.len() / channels) * channels;
            let contiguous = self.samples.make_contiguous();
            let copied = buffer.push_interleaved(&contiguous[..wanted]);
            self.samples.drain(..copied * channels);
            frames_read += copied;
        }

        Ok(frames_read)
    }
}

impl SymphoniaDecoder {
    /// Open and probe `path`
    pub fn open(path: &Path) -> Result<Self> {
        debug!("Opening source: {}", path.display());

        let file = File::open(path).map_err(|e| Error::source_open(path, e))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(ext_str) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext_str);
        }

        let mut probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::source_open(path, format!("unrecognized format: {}", e)))?;

        // Container level tags take precedence over tags found while probing
        let mut collector = TagCollector::default();
        if let Some(metadata) = probed.metadata.get() {
            if let Some(revision) = metadata.current() {
                collector.collect(revision);
            }
        }
        if let Some(revision) = probed.format.metadata().current() {
            collector.collect(revision);
        }

        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::source_open(path, "no audio track found"))?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::source_open(path, "sample rate not found"))?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::source_open(path, "channel count not found"))?;

        let short_name = symphonia::default::get_codecs()
            .get_codec(params.codec)
            .map(|d| d.short_name)
            .unwrap_or("unknown");
        let codec_id = CodecId::from_short_name(short_name);
        let reported_bit_depth = params.bits_per_sample.unwrap_or(0);

        // Packetized lossless codecs carry their depth in the format flags
        let (bits_per_channel, format_flags) = match codec_id {
            CodecId::Flac | CodecId::AppleLossless => (0, lossless_flags_for_bits(reported_bit_depth)),
            CodecId::Pcm => (reported_bit_depth, 0),
            _ => (0, 0),
        };

        let codec = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::source_open(path, format!("unsupported codec {}: {}", short_name, e)))?;

        let format = StreamFormat {
            sample_rate,
            channels,
            codec: codec_id,
            bits_per_channel,
            format_flags,
        };

        debug!(
            codec = short_name,
            sample_rate,
            channels,
            bits = reported_bit_depth,
            "Opened source"
        );

        let mut tags = collector.finish();
        if let Some(n_frames) = params.n_frames {
            tags.insert(
                keys::APPROXIMATE_DURATION.to_string(),
                RawTagValue::Float(n_frames as f64 / sample_rate as f64),
            );
        }

        Ok(Self {
            packets: PacketSource {
                path: path.to_path_buf(),
                reader,
                codec,
                track_id,
                sample_buf: None,
            },
            format,
            reported_bit_depth,
            tags,
            artwork: collector.artwork,
            pending: PendingSamples::default(),
        })
    }
}

impl PacketSource {
    /// Decode the next packet of our track into `out`.
    ///
    /// Returns false at end of stream.
    fn decode_next(&mut self, out: &mut VecDeque<i32>) -> Result<bool> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("Reached end of file: {}", self.path.display());
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    debug!("Decoder reset required, ending stream");
                    return Ok(false);
                }
                Err(e) => return Err(Error::Read(e.to_string())),
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.codec.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error, skipping packet: {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Read(e.to_string())),
            };

            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let needed = decoded.capacity() * spec.channels.count();
            let reuse = self
                .sample_buf
                .as_ref()
                .is_some_and(|buf| buf.capacity() >= needed);
            if !reuse {
                self.sample_buf = Some(SampleBuffer::<i32>::new(decoded.capacity() as u64, spec));
            }
            if let Some(sample_buf) = self.sample_buf.as_mut() {
                sample_buf.copy_interleaved_ref(decoded);
                out.extend(sample_buf.samples().iter().copied());
            }
            return Ok(true);
        }
    }
}

impl Decoder for SymphoniaDecoder {
    fn format(&self) -> &StreamFormat {
        &self.format
    }

    fn bit_depth(&self) -> Result<u32> {
        Ok(self.reported_bit_depth)
    }

    fn info_dictionary(&self) -> RawTags {
        self.tags.clone()
    }

    fn artwork(&self) -> Option<Vec<u8>> {
        self.artwork.clone()
    }

    fn read(&mut self, buffer: &mut PcmBuffer) -> Result<usize> {
        let channels = buffer.channels() as usize;
        if channels != self.format.channels as usize {
            return Err(Error::Read(format!(
                "buffer has {} channels, source has {}",
                channels, self.format.channels
            )));
        }

        let packets = &mut self.packets;
        self.pending.fill(buffer, |out| packets.decode_next(out))
    }
}

/// Builds the info dictionary from symphonia metadata revisions
#[derive(Default)]
struct TagCollector {
    tags: RawTags,
    track: Option<String>,
    total: Option<String>,
    artwork: Option<Vec<u8>>,
}

impl TagCollector {
    fn collect(&mut self, revision: &MetadataRevision) {
        for tag in revision.tags() {
            match tag.std_key {
                Some(StandardTagKey::TrackNumber) => self.track = value_text(&tag.value),
                Some(StandardTagKey::TrackTotal) => self.total = value_text(&tag.value),
                Some(std_key) => {
                    if let Some(key) = info_key(std_key, &tag.value) {
                        self.insert(key.to_string(), &tag.value);
                    } else {
                        self.insert(format!("{:?}", std_key).to_lowercase(), &tag.value);
                    }
                }
                None => self.insert(tag.key.clone(), &tag.value),
            }
        }

        if self.artwork.is_none() {
            if let Some(visual) = revision.visuals().first() {
                self.artwork = Some(visual.data.to_vec());
            }
        }
    }

    fn insert(&mut self, key: String, value: &Value) {
        if let Some(value) = raw_value(&key, value) {
            self.tags.insert(key, value);
        }
    }

    /// Fold separate number and total tags into the `"N/M"` form
    fn finish(&mut self) -> RawTags {
        if let Some(track) = self.track.take() {
            let value = match self.total.take() {
                Some(total) if !track.contains('/') => format!("{}/{}", track, total),
                _ => track,
            };
            self.tags
                .insert(keys::TRACK_NUMBER.to_string(), RawTagValue::Text(value));
        }
        std::mem::take(&mut self.tags)
    }
}

/// Info dictionary key for a standard symphonia tag
fn info_key(std_key: StandardTagKey, value: &Value) -> Option<&'static str> {
    let key = match std_key {
        StandardTagKey::Album => keys::ALBUM,
        StandardTagKey::Artist => keys::ARTIST,
        StandardTagKey::Comment => keys::COMMENTS,
        StandardTagKey::Composer => keys::COMPOSER,
        StandardTagKey::Copyright => keys::COPYRIGHT,
        StandardTagKey::Genre => keys::GENRE,
        StandardTagKey::Lyricist => keys::LYRICIST,
        StandardTagKey::TrackTitle => keys::TITLE,
        StandardTagKey::IdentIsrc => keys::ISRC,
        StandardTagKey::ReleaseDate => keys::RECORDED_DATE,
        StandardTagKey::Date => match value_text(value) {
            Some(text) if text.len() == 4 => keys::YEAR,
            _ => keys::RECORDED_DATE,
        },
        StandardTagKey::Encoder => keys::ENCODING_APPLICATION,
        StandardTagKey::EncoderSettings => keys::SOURCE_ENCODER,
        _ => return None,
    };
    Some(key)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::UnsignedInt(n) => Some(n.to_string()),
        Value::SignedInt(n) => Some(n.to_string()),
        _ => None,
    }
}

fn raw_value(key: &str, value: &Value) -> Option<RawTagValue> {
    match value {
        Value::String(s) => {
            if key == keys::RECORDED_DATE {
                if let Ok(date) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
                    return Some(RawTagValue::Date(date));
                }
            }
            Some(RawTagValue::Text(s.clone()))
        }
        Value::Binary(data) => Some(RawTagValue::Binary(data.to_vec())),
        Value::UnsignedInt(n) => i64::try_from(*n).ok().map(RawTagValue::Integer),
        Value::SignedInt(n) => Some(RawTagValue::Integer(*n)),
        Value::Float(n) => Some(RawTagValue::Float(*n)),
        Value::Boolean(b) => Some(RawTagValue::Integer(i64::from(*b))),
        Value::Flag => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Decoder stand-in: serves `packets` of stereo samples, then fails
    fn scripted(packets: Vec<Vec<i32>>) -> impl FnMut(&mut VecDeque<i32>) -> Result<bool> {
        let mut packets = VecDeque::from(packets);
        move |out| match packets.pop_front() {
            Some(packet) => {
                out.extend(packet);
                Ok(true)
            }
            None => Err(Error::Read("bad packet".to_string())),
        }
    }

    #[test]
    fn test_failure_after_partial_fill_keeps_frames() {
        let mut pending = PendingSamples::default();
        let mut buffer = PcmBuffer::new(2, 16);
        let mut decode = scripted(vec![vec![1, 2, 3, 4], vec![5, 6]]);

        let frames = pending.fill(&mut buffer, &mut decode).unwrap();
        assert_eq!(frames, 3);
        assert_eq!(buffer.samples(), &[1, 2, 3, 4, 5, 6]);

        buffer.clear();
        assert!(matches!(pending.fill(&mut buffer, &mut decode), Err(Error::Read(_))));
    }

    #[test]
    fn test_failure_with_empty_buffer_is_reported() {
        let mut pending = PendingSamples::default();
        let mut buffer = PcmBuffer::new(2, 16);

        let result = pending.fill(&mut buffer, scripted(Vec::new()));
        assert!(matches!(result, Err(Error::Read(_))));
        assert_eq!(buffer.frame_len(), 0);
    }

    #[test]
    fn test_leftover_samples_carry_to_next_read() {
        let mut pending = PendingSamples::default();
        let mut buffer = PcmBuffer::new(2, 2);
        let mut packets = VecDeque::from(vec![vec![1, 2, 3, 4, 5, 6]]);
        let mut decode = move |out: &mut VecDeque<i32>| match packets.pop_front() {
            Some(packet) => {
                out.extend(packet);
                Ok(true)
            }
            None => Ok(false),
        };

        assert_eq!(pending.fill(&mut buffer, &mut decode).unwrap(), 2);
        assert_eq!(buffer.samples(), &[1, 2, 3, 4]);

        buffer.clear();
        assert_eq!(pending.fill(&mut buffer, &mut decode).unwrap(), 1);
        assert_eq!(buffer.samples(), &[5, 6]);

        buffer.clear();
        assert_eq!(pending.fill(&mut buffer, &mut decode).unwrap(), 0);
    }

    #[test]
    fn test_open_nonexistent_file() {
        let result = SymphoniaDecoder::open(Path::new("/nonexistent/file.flac"));
        assert!(matches!(result, Err(Error::SourceOpen { .. })));
    }

    #[test]
    fn test_track_total_folding() {
        let mut collector = TagCollector {
            track: Some("4".to_string()),
            total: Some("11".to_string()),
            ..Default::default()
        };
        let tags = collector.finish();
        assert_eq!(
            tags.get(keys::TRACK_NUMBER),
            Some(&RawTagValue::Text("4/11".to_string()))
        );

        let mut collector = TagCollector {
            track: Some("4/12".to_string()),
            total: Some("11".to_string()),
            ..Default::default()
        };
        assert_eq!(
            collector.finish().get(keys::TRACK_NUMBER),
            Some(&RawTagValue::Text("4/12".to_string()))
        );
    }

    #[test]
    fn test_date_keys() {
        let year = Value::String("1999".to_string());
        assert_eq!(info_key(StandardTagKey::Date, &year), Some(keys::YEAR));

        let full = Value::String("1999-03-01".to_string());
        assert_eq!(info_key(StandardTagKey::Date, &full), Some(keys::RECORDED_DATE));
        assert_eq!(
            raw_value(keys::RECORDED_DATE, &full),
            Some(RawTagValue::Date(NaiveDate::from_ymd_opt(1999, 3, 1).unwrap()))
        );
    }
}
