use super::{
    call, not_supported, payload_delta, repeat_count, required_attr, target, RequestContext,
};
use crate::alexa::consts::{lookup, normalize_source, VALID_SOURCE_NAMES};
use crate::alexa::errors::{AlexaError, HandlerResult};
use crate::alexa::messages::{Directive, PropertyReport, Response};
use crate::config::SmartHomeConfig;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Steps used when Alexa sends its own default (10 is far too loud)
const DEFAULT_VOLUME_STEPS: u64 = 1;

/// Directive mapped to one parameterless service on the entity's domain
async fn simple(
    config: &SmartHomeConfig,
    directive: &Directive,
    context: &RequestContext,
    service: &str,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    call(config, context, entity.domain(), service, target(entity)).await?;
    Ok(directive.response())
}

pub async fn set_volume(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let volume = directive.payload_f64("volume")?.round() / 100.0;

    let mut data = target(entity);
    data.insert("volume_level".into(), json!(volume));
    call(config, context, entity.domain(), "volume_set", data).await?;

    Ok(directive.response())
}

pub async fn adjust_volume(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let delta = payload_delta(directive, "volume", 100)?;
    let current = (required_attr(entity, "volume_level")? * 100.0).floor() as i64;
    let volume = current.saturating_add(delta).clamp(0, 100) as f64 / 100.0;

    let mut data = target(entity);
    data.insert("volume_level".into(), json!(volume));
    call(config, context, entity.domain(), "volume_set", data).await?;

    Ok(directive.response())
}

/// One volume_up/volume_down call per step, in order
pub async fn adjust_volume_steps(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let (down, steps) = if directive.payload_bool("volumeStepsDefault") {
        (directive.payload_f64("volumeSteps")? < 0.0, DEFAULT_VOLUME_STEPS)
    } else {
        repeat_count(directive, "volumeSteps")?
    };

    let service = if down { "volume_down" } else { "volume_up" };
    for _ in 0..steps {
        call(config, context, entity.domain(), service, target(entity)).await?;
    }

    Ok(directive.response())
}

pub async fn set_mute(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;

    let mut data = target(entity);
    data.insert("is_volume_muted".into(), json!(directive.payload_bool("mute")));
    call(config, context, entity.domain(), "volume_mute", data).await?;

    Ok(directive.response())
}

pub async fn play(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    simple(config, directive, context, "media_play").await
}

pub async fn pause(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    simple(config, directive, context, "media_pause").await
}

/// Covers expose Stop through the playback interface too
pub async fn stop(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let service = match directive.entity()?.domain() {
        "cover" => "stop_cover",
        _ => "media_stop",
    };
    simple(config, directive, context, service).await
}

pub async fn next(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    simple(config, directive, context, "media_next_track").await
}

pub async fn previous(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    simple(config, directive, context, "media_previous_track").await
}

/// Backend source matching an Alexa input name.
///
/// A trailing "1" is ignored so "HDMI 1" selects a single "HDMI" source.
fn match_source<'a>(sources: &'a [String], input: &str) -> Option<&'a str> {
    let wanted = input.to_lowercase().replace(' ', "");

    sources
        .iter()
        .find(|source| {
            let formatted = normalize_source(source);
            let known = lookup(VALID_SOURCE_NAMES, &formatted).is_some();
            (known && formatted == wanted)
                || (wanted.ends_with('1') && formatted == wanted.trim_end_matches('1'))
        })
        .map(String::as_str)
}

pub async fn select_input(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let input = directive.payload_str("input")?;

    let sources = entity.attr_list("source_list");
    let source = match_source(&sources, input).ok_or_else(|| {
        AlexaError::InvalidValue(format!(
            "failed to map input {} to a media source on {}",
            input, entity.entity_id
        ))
    })?;

    let mut data = target(entity);
    data.insert("source".into(), json!(source));
    call(config, context, entity.domain(), "select_source", data).await?;

    Ok(directive.response())
}

/// Channel identifier and the property key it is reported under
fn channel_identifier(directive: &Directive) -> (&'static str, Value) {
    let channel = directive.payload.get("channel");
    for key in ["number", "callSign", "affiliateCallSign", "uri"] {
        if let Some(value) = channel.and_then(|c| c.get(key)) {
            return (key, value.clone());
        }
    }

    let metadata_name = directive
        .payload
        .get("channelMetadata")
        .and_then(|m| m.get("name"));
    match metadata_name {
        Some(name) => ("callSign", name.clone()),
        None => ("number", json!("0")),
    }
}

pub async fn change_channel(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let (key, channel) = channel_identifier(directive);

    let mut data = target(entity);
    data.insert("media_content_id".into(), channel.clone());
    data.insert("media_content_type".into(), json!("channel"));
    call(config, context, entity.domain(), "play_media", data).await?;

    let mut value = Map::new();
    value.insert(key.into(), channel);

    let mut response = directive.response();
    response.add_context_property(PropertyReport::new(
        "Alexa.ChannelController",
        "channel",
        Value::Object(value),
    ));
    Ok(response)
}

/// Skip by issuing next/previous track once per channel
pub async fn skip_channels(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let (backwards, count) = repeat_count(directive, "channelCount")?;

    let service = if backwards {
        "media_previous_track"
    } else {
        "media_next_track"
    };
    for _ in 0..count {
        call(config, context, entity.domain(), service, target(entity)).await?;
    }

    let mut response = directive.response();
    response.add_context_property(PropertyReport::new(
        "Alexa.ChannelController",
        "channel",
        json!({"number": ""}),
    ));
    Ok(response)
}

/// Relative seek, clamped to [0, media_duration]
pub async fn adjust_seek_position(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let delta_ms = payload_delta(directive, "deltaPositionMilliseconds", i64::MAX)?;

    let current = entity
        .attr_f64("media_position")
        .filter(|position| *position != 0.0)
        .ok_or_else(|| {
            AlexaError::VideoActionNotPermittedForContent(format!(
                "{} did not return the current media position.",
                entity.entity_id
            ))
        })? as i64;

    let mut position = current.saturating_add(delta_ms / 1000).max(0);
    if let Some(duration) = entity.attr_f64("media_duration").map(|d| d as i64) {
        if duration > 0 && duration < position {
            position = duration;
        }
    }

    let mut data = target(entity);
    data.insert("seek_position".into(), json!(position));
    call(config, context, "media_player", "media_seek", data).await?;

    let mut payload = Map::new();
    payload.insert(
        "properties".into(),
        json!([{"name": "positionMilliseconds", "value": position.saturating_mul(1000)}]),
    );
    Ok(directive.response_with("StateReport", "Alexa.SeekController", payload))
}

pub async fn set_equalizer_mode(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let mode = directive.payload_str("mode")?.to_lowercase();

    if !entity.attr_list("sound_mode_list").contains(&mode) {
        return Err(AlexaError::InvalidValue(format!(
            "failed to map sound mode {} to a mode on {}",
            mode, entity.entity_id
        )));
    }

    let mut data = target(entity);
    data.insert("sound_mode".into(), json!(mode));
    call(config, context, entity.domain(), "select_sound_mode", data).await?;

    Ok(directive.response())
}

/// Only sound modes are supported, never individual bands
pub async fn bands(
    _config: &Arc<SmartHomeConfig>,
    _directive: &Directive,
    _context: &RequestContext,
) -> HandlerResult<Response> {
    Err(not_supported())
}

/// Hand Alexa an HLS stream URL and a snapshot image for the camera
pub async fn initialize_camera_streams(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    _context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let settings = config.settings();
    let base_url = settings.stream_base_url().ok_or_else(|| {
        AlexaError::InvalidValue("Failed to find suitable URL to serve to Alexa".into())
    })?;

    let stream_path = config.backend().request_stream(&entity.entity_id).await?;
    let image_path = entity.attr_str("entity_picture").ok_or_else(|| {
        AlexaError::InvalidValue(format!("{} has no entity_picture", entity.entity_id))
    })?;

    let mut payload = Map::new();
    payload.insert(
        "cameraStreams".into(),
        json!([{
            "uri": format!("{}{}", base_url, stream_path),
            "protocol": "HLS",
            "resolution": {"width": 1280, "height": 720},
            "authorizationType": "NONE",
            "videoCodec": "H264",
            "audioCodec": "AAC",
        }]),
    );
    payload.insert("imageUri".into(), json!(format!("{}{}", base_url, image_path)));

    Ok(directive.response_with("Response", "Alexa.CameraStreamController", payload))
}
