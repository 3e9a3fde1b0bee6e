//! Stimulus audio endpoint

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use hearscreen_common::{tone, Channel, Error};
use serde::Deserialize;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

const DEFAULT_FREQUENCY_HZ: i64 = 1000;
const DEFAULT_DURATION_S: f64 = 0.35;
const DEFAULT_VOLUME: f64 = 1.0;

#[derive(Debug, Default, Deserialize)]
pub struct ToneQuery {
    pub freq: Option<i64>,
    pub duration: Option<f64>,
    pub volume: Option<f64>,
    pub channel: Option<String>,
}

/// GET /tone?freq=&duration=&volume=&channel=
///
/// Returns a 16-bit stereo WAV clip. Missing parameters take the defaults
/// (1000 Hz, 0.35 s, full volume, both channels).
pub async fn generate_tone(
    State(state): State<AppState>,
    query: Result<Query<ToneQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    let freq = query.freq.unwrap_or(DEFAULT_FREQUENCY_HZ);
    let frequency_hz = u32::try_from(freq)
        .map_err(|_| ApiError(Error::OutOfRange(format!("Frequency {} Hz out of range", freq))))?;

    let channel = match query.channel.as_deref() {
        Some(name) => name.parse::<Channel>()?,
        None => Channel::Both,
    };

    let duration = query.duration.unwrap_or(DEFAULT_DURATION_S);
    let volume = query.volume.unwrap_or(DEFAULT_VOLUME);

    let mut clip = tone::synthesize(frequency_hz, duration, volume, channel)?;
    if state.tone.swap_stereo_channels {
        clip = clip.swap_channels();
    }
    let wav = clip.to_wav()?;

    debug!(
        "Tone {} Hz {:.3}s volume {:.4} channel {} ({} bytes)",
        frequency_hz,
        duration,
        volume,
        channel,
        wav.len()
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        wav,
    )
        .into_response())
}
