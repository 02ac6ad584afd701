use crate::alexa::capabilities::{
    supported_features, Capability, CapabilityError, PropertyResult,
};
use crate::alexa::consts::features::{cover, media_player};
use crate::alexa::consts::{
    lookup, normalize_source, EQUALIZER_MODES, LOCALES_CAMERA, LOCALES_SPEAKER,
    VALID_SOURCE_NAMES,
};
use crate::state::Entity;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct Speaker {
    entity: Arc<Entity>,
}

impl Speaker {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }
}

impl Capability for Speaker {
    fn name(&self) -> &'static str {
        "Alexa.Speaker"
    }

    fn supported_locales(&self) -> &'static [&'static str] {
        LOCALES_SPEAKER
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        let features = supported_features(&self.entity).unwrap_or(0);
        if features & media_player::VOLUME_MUTE != 0 {
            &["volume", "muted"]
        } else {
            &["volume"]
        }
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        match name {
            "volume" => Ok(self
                .entity
                .attr_f64("volume_level")
                .map(|level| json!((level * 100.0).round() as i64))),
            "muted" => Ok(Some(json!(self
                .entity
                .attr_bool("is_volume_muted")
                .unwrap_or(false)))),
            _ => Err(CapabilityError::unsupported(self.name(), name)),
        }
    }
}

/// Relative volume steps for players without absolute volume
pub struct StepSpeaker;

impl Capability for StepSpeaker {
    fn name(&self) -> &'static str {
        "Alexa.StepSpeaker"
    }

    fn supported_locales(&self) -> &'static [&'static str] {
        LOCALES_SPEAKER
    }
}

pub struct PlaybackController {
    entity: Arc<Entity>,
}

impl PlaybackController {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }
}

impl Capability for PlaybackController {
    fn name(&self) -> &'static str {
        "Alexa.PlaybackController"
    }

    fn supported_operations(&self) -> Option<Vec<&'static str>> {
        let features = supported_features(&self.entity).unwrap_or(0);
        let operations: &[(u64, &'static str)] = if self.entity.domain() == "cover" {
            &[(cover::STOP, "Stop")]
        } else {
            &[
                (media_player::NEXT_TRACK, "Next"),
                (media_player::PAUSE, "Pause"),
                (media_player::PLAY, "Play"),
                (media_player::PREVIOUS_TRACK, "Previous"),
                (media_player::STOP, "Stop"),
            ]
        };

        Some(
            operations
                .iter()
                .filter(|(bit, _)| features & bit != 0)
                .map(|(_, operation)| *operation)
                .collect(),
        )
    }
}

pub struct PlaybackStateReporter {
    entity: Arc<Entity>,
}

impl PlaybackStateReporter {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }
}

impl Capability for PlaybackStateReporter {
    fn name(&self) -> &'static str {
        "Alexa.PlaybackStateReporter"
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["playbackState"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "playbackState" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        let state = match self.entity.state.as_str() {
            "playing" => "PLAYING",
            "paused" => "PAUSED",
            _ => "STOPPED",
        };
        Ok(Some(json!({ "state": state })))
    }
}

/// Alexa input names for the sources a player offers; unknown sources are dropped
pub fn valid_inputs(sources: &[String]) -> Vec<Value> {
    sources
        .iter()
        .filter_map(|source| lookup(VALID_SOURCE_NAMES, &normalize_source(source)))
        .map(|name| json!({ "name": name }))
        .collect()
}

pub struct InputController {
    entity: Arc<Entity>,
}

impl InputController {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }
}

impl Capability for InputController {
    fn name(&self) -> &'static str {
        "Alexa.InputController"
    }

    fn inputs(&self) -> Option<Value> {
        Some(Value::Array(valid_inputs(
            &self.entity.attr_list("source_list"),
        )))
    }
}

pub struct ChannelController;

impl Capability for ChannelController {
    fn name(&self) -> &'static str {
        "Alexa.ChannelController"
    }
}

pub struct SeekController;

impl Capability for SeekController {
    fn name(&self) -> &'static str {
        "Alexa.SeekController"
    }
}

/// Sound-mode equalizer; bands are not supported
pub struct EqualizerController {
    entity: Arc<Entity>,
}

impl EqualizerController {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }

    /// Upper-cased sound modes Alexa knows about
    pub fn valid_modes(sound_modes: &[String]) -> Vec<String> {
        sound_modes
            .iter()
            .map(|mode| mode.to_uppercase())
            .filter(|mode| EQUALIZER_MODES.contains(&mode.as_str()))
            .collect()
    }
}

impl Capability for EqualizerController {
    fn name(&self) -> &'static str {
        "Alexa.EqualizerController"
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["mode"]
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "mode" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        Ok(self
            .entity
            .attr_str("sound_mode")
            .map(str::to_uppercase)
            .filter(|mode| EQUALIZER_MODES.contains(&mode.as_str()))
            .map(|mode| json!(mode)))
    }

    fn configurations(&self) -> Option<Value> {
        let modes = Self::valid_modes(&self.entity.attr_list("sound_mode_list"));
        if modes.is_empty() {
            return None;
        }
        let supported: Vec<Value> = modes.iter().map(|mode| json!({ "name": mode })).collect();
        Some(json!({"modes": {"supported": supported}}))
    }
}

/// HLS camera streams; offered only when the backend is reachable over HTTPS
pub struct CameraStreamController;

impl Capability for CameraStreamController {
    fn name(&self) -> &'static str {
        "Alexa.CameraStreamController"
    }

    fn supported_locales(&self) -> &'static [&'static str] {
        LOCALES_CAMERA
    }

    fn camera_stream_configurations(&self) -> Option<Value> {
        Some(json!([{
            "protocols": ["HLS"],
            "resolutions": [{"width": 1280, "height": 720}],
            "authorizationTypes": ["NONE"],
            "videoCodecs": ["H264"],
            "audioCodecs": ["AAC"],
        }]))
    }
}
