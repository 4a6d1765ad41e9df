//! Payload → PCM decoding with last-request-wins supersession.
//!
//! A load is split in three so the owner never blocks on a decode:
//! `AudioDecoder::begin` hands out a `DecodeJob` stamped with a fresh ticket,
//! the job runs anywhere (`DecodeJob::run` is `Send` and CPU-bound), and the
//! owner checks `AudioDecoder::is_current` before applying the outcome.

use std::borrow::Cow;
use std::io::{Cursor, ErrorKind};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::Engine;
use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::models::asset::AudioAsset;
use crate::models::error::DecodeError;

/// Identity of one decode request. Later tickets compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecodeTicket(u64);

/// Issues decode jobs and tracks which one is current.
#[derive(Debug, Clone)]
pub struct AudioDecoder {
    latest: Arc<AtomicU64>,
    max_payload_bytes: usize,
}

impl AudioDecoder {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self {
            latest: Arc::new(AtomicU64::new(0)),
            max_payload_bytes,
        }
    }

    /// Start a new request, invalidating every earlier ticket.
    pub fn begin(&self, payload: String, name: Option<String>) -> DecodeJob {
        let ticket = DecodeTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1);
        debug!("decode request {:?} issued", ticket);
        DecodeJob {
            ticket,
            payload,
            name,
            max_payload_bytes: self.max_payload_bytes,
            latest: Arc::clone(&self.latest),
        }
    }

    pub fn is_current(&self, ticket: DecodeTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// A pending decode, runnable on any thread.
#[derive(Debug)]
pub struct DecodeJob {
    ticket: DecodeTicket,
    payload: String,
    name: Option<String>,
    max_payload_bytes: usize,
    latest: Arc<AtomicU64>,
}

impl DecodeJob {
    pub fn ticket(&self) -> DecodeTicket {
        self.ticket
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn superseded(&self) -> bool {
        self.latest.load(Ordering::SeqCst) != self.ticket.0
    }

    /// Decode the payload. Skips the work if a newer request already exists.
    pub fn run(self) -> DecodeOutcome {
        let result = if self.superseded() {
            Err(DecodeError::Superseded)
        } else {
            payload_bytes(&self.payload, self.max_payload_bytes)
                .and_then(|bytes| decode_bytes(bytes, self.name.as_deref()))
        };

        DecodeOutcome {
            ticket: self.ticket,
            name: self.name,
            result,
        }
    }
}

/// Result of a `DecodeJob`, to be handed back to the engine that issued it.
#[derive(Debug)]
pub struct DecodeOutcome {
    pub ticket: DecodeTicket,
    pub name: Option<String>,
    pub result: Result<AudioAsset, DecodeError>,
}

/// Turn portable payload text into file bytes.
///
/// Accepts bare base64 or a full `data:<mime>;base64,<payload>` URL. ASCII
/// whitespace anywhere in the payload is ignored, so MIME-wrapped text works.
pub fn payload_bytes(text: &str, max_payload_bytes: usize) -> Result<Vec<u8>, DecodeError> {
    let text = text.trim();
    let encoded = match text.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
        None => text,
    };
    let encoded: Cow<'_, str> = if encoded.bytes().any(|b| b.is_ascii_whitespace()) {
        Cow::Owned(encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect())
    } else {
        Cow::Borrowed(encoded)
    };

    let estimated = encoded.len() / 4 * 3;
    if estimated > max_payload_bytes.saturating_add(3) {
        return Err(DecodeError::PayloadTooLarge {
            size: estimated,
            limit: max_payload_bytes,
        });
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;

    if bytes.len() > max_payload_bytes {
        return Err(DecodeError::PayloadTooLarge {
            size: bytes.len(),
            limit: max_payload_bytes,
        });
    }
    Ok(bytes)
}

fn decode_bytes(bytes: Vec<u8>, name: Option<&str>) -> Result<AudioAsset, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut hint = Hint::new();
    if let Some(ext) = name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
    {
        hint.with_extension(&ext.to_ascii_lowercase());
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), MediaSourceStreamOptions::default());
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut sample_rate = params.sample_rate.unwrap_or(0);
    let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) if samples.is_empty() => return Err(DecodeError::Malformed(e.to_string())),
            Err(e) => {
                warn!("stopping decode early: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let needed = decoded.capacity() * spec.channels.count();
                if sample_buf.as_ref().map_or(true, |buf| buf.capacity() < needed) {
                    sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                }
                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(DecodeError::Malformed(e.to_string())),
        }
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(DecodeError::Empty);
    }

    let asset = AudioAsset::new(samples, sample_rate, channels, name.map(str::to_owned));
    debug!(
        "decoded {} frames at {} Hz x{} ({:.2}s)",
        asset.frame_count(),
        asset.sample_rate(),
        asset.channels(),
        asset.duration_secs()
    );
    Ok(asset)
}
