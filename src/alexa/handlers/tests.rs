use super::*;
use crate::alexa::consts::TempUnit;
use crate::config::{AuthStore, SmartHomeSettings};
use crate::state::StateStore;

fn setup(settings: SmartHomeSettings) -> (Arc<StateStore>, Arc<SmartHomeConfig>) {
    let store = Arc::new(StateStore::new());
    let config = Arc::new(SmartHomeConfig::new(
        settings,
        store.clone(),
        None,
        AuthStore::in_memory(),
    ));
    (store, config)
}

fn request(namespace: &str, name: &str, entity_id: &str, payload: Value) -> Value {
    json!({
        "directive": {
            "header": {
                "namespace": namespace,
                "name": name,
                "messageId": "5f8a426e-01e4-4cc9-8b79-65f8bd0fd8a4",
                "correlationToken": "token-1",
                "payloadVersion": "3",
            },
            "endpoint": {
                "scope": {"type": "BearerToken", "token": "access"},
                "endpointId": entity_id.replace('.', "#"),
            },
            "payload": payload,
        }
    })
}

fn with_instance(mut request: Value, instance: &str) -> Value {
    request["directive"]["header"]["instance"] = json!(instance);
    request
}

async fn run(config: &Arc<SmartHomeConfig>, request: Value) -> HandlerResult<Response> {
    let mut directive = Directive::parse(&request).unwrap();
    directive.load_entity(config).await?;
    let handler = lookup(&directive.namespace, &directive.name).unwrap();
    handler(config, &directive, &RequestContext::new()).await
}

/// (domain, service, data) of every call received
async fn calls(store: &StateStore) -> Vec<(String, String, Value)> {
    store
        .service_calls()
        .await
        .into_iter()
        .map(|call| (call.domain, call.service, Value::Object(call.data)))
        .collect()
}

#[test]
fn test_lookup_covers_registered_directives() {
    for (namespace, name) in registered() {
        assert!(lookup(namespace, name).is_some(), "{}.{}", namespace, name);
    }
    assert!(lookup("Alexa.PowerController", "Toggle").is_none());
    assert!(lookup("Alexa.EqualizerController", "AdjustMode").is_none());
}

#[test]
fn test_temperature_conversion() {
    let f = TempUnit::Fahrenheit;
    let c = TempUnit::Celsius;

    let absolute = |value: Value, unit| temperature_from_object(&value, unit, false).unwrap();
    let interval = |value: Value, unit| temperature_from_object(&value, unit, true).unwrap();

    assert_eq!(absolute(json!({"value": 20.0, "scale": "CELSIUS"}), f), 68.0);
    assert_eq!(absolute(json!({"value": 68.0, "scale": "FAHRENHEIT"}), c), 20.0);
    assert!((absolute(json!({"value": 293.15, "scale": "KELVIN"}), c) - 20.0).abs() < 1e-9);

    assert_eq!(interval(json!({"value": 10.0, "scale": "CELSIUS"}), f), 18.0);
    assert_eq!(interval(json!({"value": 9.0, "scale": "FAHRENHEIT"}), c), 5.0);
    assert_eq!(interval(json!({"value": -10.0, "scale": "KELVIN"}), f), -10.0);

    assert!(temperature_from_object(&json!({"scale": "CELSIUS"}), c, false).is_err());
}

#[tokio::test]
async fn test_turn_on_switch() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("switch.test", "off", json!({}));

    let response = run(
        &config,
        request("Alexa.PowerController", "TurnOn", "switch.test", json!({})),
    )
    .await
    .unwrap();

    assert_eq!(response.name, "Response");
    assert_eq!(response.namespace, "Alexa");
    assert_eq!(response.correlation_token.as_deref(), Some("token-1"));
    assert_eq!(
        calls(&store).await,
        vec![(
            "switch".to_string(),
            "turn_on".to_string(),
            json!({"entity_id": "switch.test"})
        )]
    );
}

#[tokio::test]
async fn test_service_calls_carry_request_context() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("switch.test", "off", json!({}));

    run(&config, request("Alexa.PowerController", "TurnOff", "switch.test", json!({})))
        .await
        .unwrap();

    let recorded = store.service_calls().await;
    assert!(recorded[0].context_id.is_some());
}

#[tokio::test]
async fn test_power_domain_specialisations() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("group.downstairs", "off", json!({}));
    store.set_state("cover.garage", "closed", json!({}));
    store.set_state("vacuum.robot", "docked", json!({"supported_features": 8192}));
    store.set_state("media_player.tv", "off", json!({"supported_features": 0}));

    for entity_id in ["group.downstairs", "cover.garage", "vacuum.robot", "media_player.tv"] {
        run(&config, request("Alexa.PowerController", "TurnOn", entity_id, json!({})))
            .await
            .unwrap();
    }

    let services: Vec<(String, String)> = calls(&store)
        .await
        .into_iter()
        .map(|(domain, service, _)| (domain, service))
        .collect();
    assert_eq!(
        services,
        vec![
            ("homeassistant".to_string(), "turn_on".to_string()),
            ("cover".to_string(), "open_cover".to_string()),
            ("vacuum".to_string(), "start".to_string()),
            ("media_player".to_string(), "media_play".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_set_brightness_from_string() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("light.desk", "on", json!({"brightness": 128}));

    run(
        &config,
        request(
            "Alexa.BrightnessController",
            "SetBrightness",
            "light.desk",
            json!({"brightness": "50"}),
        ),
    )
    .await
    .unwrap();

    assert_eq!(
        calls(&store).await,
        vec![(
            "light".to_string(),
            "turn_on".to_string(),
            json!({"entity_id": "light.desk", "brightness_pct": 50})
        )]
    );
}

#[tokio::test]
async fn test_adjust_brightness_never_negative() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("light.desk", "on", json!({"brightness": 255}));
    store.set_state("light.hall", "off", json!({}));

    run(
        &config,
        request(
            "Alexa.BrightnessController",
            "AdjustBrightness",
            "light.desk",
            json!({"brightnessDelta": -25}),
        ),
    )
    .await
    .unwrap();
    run(
        &config,
        request(
            "Alexa.BrightnessController",
            "AdjustBrightness",
            "light.hall",
            json!({"brightnessDelta": -25}),
        ),
    )
    .await
    .unwrap();

    let recorded = calls(&store).await;
    assert_eq!(recorded[0].2["brightness_pct"], json!(75));
    assert_eq!(recorded[1].2["brightness_pct"], json!(0));
}

#[tokio::test]
async fn test_color_temperature_steps_are_bounded() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state(
        "light.desk",
        "on",
        json!({"color_temp": 170, "min_mireds": 153, "max_mireds": 500}),
    );

    run(
        &config,
        request(
            "Alexa.ColorTemperatureController",
            "IncreaseColorTemperature",
            "light.desk",
            json!({}),
        ),
    )
    .await
    .unwrap();
    run(
        &config,
        request(
            "Alexa.ColorTemperatureController",
            "DecreaseColorTemperature",
            "light.desk",
            json!({}),
        ),
    )
    .await
    .unwrap();

    let recorded = calls(&store).await;
    assert_eq!(recorded[0].2["color_temp"], json!(153));
    assert_eq!(recorded[1].2["color_temp"], json!(220));
}

#[tokio::test]
async fn test_set_color_uses_hs() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("light.desk", "on", json!({}));

    run(
        &config,
        request(
            "Alexa.ColorController",
            "SetColor",
            "light.desk",
            json!({"color": {"hue": 350.5, "saturation": 0.75, "brightness": 1.0}}),
        ),
    )
    .await
    .unwrap();

    let recorded = calls(&store).await;
    assert_eq!(recorded[0].2["hs_color"], json!([350.5, 75.0]));
    assert_eq!(recorded[0].2["brightness"], json!(255));
}

fn fahrenheit() -> SmartHomeSettings {
    SmartHomeSettings {
        temperature_unit: TempUnit::Fahrenheit,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_adjust_target_temperature_kelvin_interval() {
    let (store, config) = setup(fahrenheit());
    store.set_state(
        "climate.hall",
        "heat",
        json!({"temperature": 62, "min_temp": 50, "max_temp": 90}),
    );

    let response = run(
        &config,
        request(
            "Alexa.ThermostatController",
            "AdjustTargetTemperature",
            "climate.hall",
            json!({"targetSetpointDelta": {"value": -10.0, "scale": "KELVIN"}}),
        ),
    )
    .await
    .unwrap();

    let recorded = calls(&store).await;
    assert_eq!(recorded[0].1, "set_temperature");
    assert_eq!(recorded[0].2["temperature"], json!(52.0));

    let setpoint = &response.context_properties()[0];
    assert_eq!(setpoint.name, "targetSetpoint");
    assert_eq!(setpoint.value, json!({"value": 52.0, "scale": "FAHRENHEIT"}));
}

#[tokio::test]
async fn test_adjust_without_target_temperature() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("climate.hall", "off", json!({"min_temp": 7, "max_temp": 35}));

    let err = run(
        &config,
        request(
            "Alexa.ThermostatController",
            "AdjustTargetTemperature",
            "climate.hall",
            json!({"targetSetpointDelta": {"value": 1.0, "scale": "CELSIUS"}}),
        ),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AlexaError::UnsupportedThermostatTargetState(_)));
    assert!(store.service_calls().await.is_empty());
}

#[tokio::test]
async fn test_set_target_temperature_out_of_range() {
    let (store, config) = setup(fahrenheit());
    store.set_state("climate.hall", "heat", json!({"min_temp": 50, "max_temp": 90}));

    let err = run(
        &config,
        request(
            "Alexa.ThermostatController",
            "SetTargetTemperature",
            "climate.hall",
            json!({"targetSetpoint": {"value": 40.0, "scale": "CELSIUS"}}),
        ),
    )
    .await
    .unwrap_err();

    match err {
        AlexaError::TempRange {
            temperature,
            min,
            max,
            unit,
        } => {
            assert_eq!(temperature, 104.0);
            assert_eq!((min, max), (50.0, 90.0));
            assert_eq!(unit, TempUnit::Fahrenheit);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(store.service_calls().await.is_empty());
}

#[tokio::test]
async fn test_set_target_temperature_range_setpoints() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("climate.hall", "heat_cool", json!({"min_temp": 7, "max_temp": 35}));

    let response = run(
        &config,
        request(
            "Alexa.ThermostatController",
            "SetTargetTemperature",
            "climate.hall",
            json!({
                "lowerSetpoint": {"value": 18.0, "scale": "CELSIUS"},
                "upperSetpoint": {"value": 24.0, "scale": "CELSIUS"},
            }),
        ),
    )
    .await
    .unwrap();

    let recorded = calls(&store).await;
    assert_eq!(recorded[0].2["target_temp_low"], json!(18.0));
    assert_eq!(recorded[0].2["target_temp_high"], json!(24.0));

    let names: Vec<&str> = response
        .context_properties()
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(names, vec!["lowerSetpoint", "upperSetpoint"]);
}

#[tokio::test]
async fn test_set_thermostat_mode_prefers_first_table_entry() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state(
        "climate.hall",
        "heat",
        json!({"hvac_modes": ["fan_only", "off", "heat", "dry"], "preset_modes": ["eco"]}),
    );

    let modes = [
        json!({"thermostatMode": {"value": "OFF"}}),
        json!({"thermostatMode": "ECO"}),
        json!({"thermostatMode": {"value": "CUSTOM", "customName": "DEHUMIDIFY"}}),
    ];
    for payload in modes {
        run(
            &config,
            request("Alexa.ThermostatController", "SetThermostatMode", "climate.hall", payload),
        )
        .await
        .unwrap();
    }

    let recorded = calls(&store).await;
    assert_eq!(recorded[0].1, "set_hvac_mode");
    assert_eq!(recorded[0].2["hvac_mode"], json!("off"));
    assert_eq!(recorded[1].1, "set_preset_mode");
    assert_eq!(recorded[1].2["preset_mode"], json!("eco"));
    assert_eq!(recorded[2].2["hvac_mode"], json!("dry"));
}

#[tokio::test]
async fn test_set_thermostat_mode_unsupported() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("climate.hall", "heat", json!({"hvac_modes": ["heat", "off"]}));

    let err = run(
        &config,
        request(
            "Alexa.ThermostatController",
            "SetThermostatMode",
            "climate.hall",
            json!({"thermostatMode": {"value": "COOL"}}),
        ),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AlexaError::UnsupportedThermostatMode(_)));
    assert_eq!(err.error_type(), "UNSUPPORTED_THERMOSTAT_MODE");
}

#[tokio::test]
async fn test_unlock_refused_outside_allowed_locales() {
    let settings = SmartHomeSettings {
        locale: "fr-FR".into(),
        ..Default::default()
    };
    let (store, config) = setup(settings);
    store.set_state("lock.front", "locked", json!({}));

    let err = run(
        &config,
        request("Alexa.LockController", "Unlock", "lock.front", json!({})),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AlexaError::InvalidDirective(_)));
    assert!(store.service_calls().await.is_empty());
}

#[tokio::test]
async fn test_lock_reports_anticipated_state() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("lock.front", "unlocked", json!({}));

    let response = run(
        &config,
        request("Alexa.LockController", "Lock", "lock.front", json!({})),
    )
    .await
    .unwrap();

    let property = &response.context_properties()[0];
    assert_eq!(property.name, "lockState");
    assert_eq!(property.value, json!("LOCKED"));
}

#[tokio::test]
async fn test_arm_requires_disarmed_panel() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("alarm_control_panel.home", "armed_away", json!({}));

    let err = run(
        &config,
        request(
            "Alexa.SecurityPanelController",
            "Arm",
            "alarm_control_panel.home",
            json!({"armState": "ARMED_STAY"}),
        ),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AlexaError::SecurityPanelAuthorizationRequired(_)));
    assert!(store.service_calls().await.is_empty());
}

#[tokio::test]
async fn test_arm_response() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("alarm_control_panel.home", "disarmed", json!({}));

    let response = run(
        &config,
        request(
            "Alexa.SecurityPanelController",
            "Arm",
            "alarm_control_panel.home",
            json!({"armState": "ARMED_STAY"}),
        ),
    )
    .await
    .unwrap();

    assert_eq!(response.name, "Arm.Response");
    assert_eq!(response.payload["exitDelayInSeconds"], json!(0));
    assert_eq!(calls(&store).await[0].1, "alarm_arm_home");
}

#[tokio::test]
async fn test_disarm_with_rejected_code() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("alarm_control_panel.home", "armed_away", json!({}));
    store.set_service_result("alarm_control_panel", "alarm_disarm", false);

    let err = run(
        &config,
        request(
            "Alexa.SecurityPanelController",
            "Disarm",
            "alarm_control_panel.home",
            json!({"authorization": {"type": "FOUR_DIGIT_PIN", "value": "1234"}}),
        ),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AlexaError::SecurityPanelUnauthorized(_)));
    assert_eq!(calls(&store).await[0].2["code"], json!("1234"));
}

#[tokio::test]
async fn test_disarm_already_disarmed() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("alarm_control_panel.home", "disarmed", json!({}));

    let response = run(
        &config,
        request(
            "Alexa.SecurityPanelController",
            "Disarm",
            "alarm_control_panel.home",
            json!({}),
        ),
    )
    .await
    .unwrap();

    assert_eq!(response.name, "Response");
    assert!(response.context_properties().is_empty());
    assert!(store.service_calls().await.is_empty());
}

#[tokio::test]
async fn test_step_speaker_default_is_one_step() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("media_player.tv", "on", json!({}));

    run(
        &config,
        request(
            "Alexa.StepSpeaker",
            "AdjustVolume",
            "media_player.tv",
            json!({"volumeSteps": -10, "volumeStepsDefault": true}),
        ),
    )
    .await
    .unwrap();

    let recorded = calls(&store).await;
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].1, "volume_down");
}

#[tokio::test]
async fn test_skip_channels_calls_in_sequence() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("media_player.tv", "on", json!({}));

    run(
        &config,
        request(
            "Alexa.ChannelController",
            "SkipChannels",
            "media_player.tv",
            json!({"channelCount": -3}),
        ),
    )
    .await
    .unwrap();

    let services: Vec<String> = calls(&store).await.into_iter().map(|c| c.1).collect();
    assert_eq!(services, vec!["media_previous_track"; 3]);
}

#[tokio::test]
async fn test_change_channel_by_metadata_name() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("media_player.tv", "on", json!({}));

    let response = run(
        &config,
        request(
            "Alexa.ChannelController",
            "ChangeChannel",
            "media_player.tv",
            json!({"channel": {}, "channelMetadata": {"name": "ABC"}}),
        ),
    )
    .await
    .unwrap();

    let recorded = calls(&store).await;
    assert_eq!(recorded[0].1, "play_media");
    assert_eq!(recorded[0].2["media_content_id"], json!("ABC"));
    assert_eq!(response.context_properties()[0].value, json!({"callSign": "ABC"}));
}

#[tokio::test]
async fn test_select_input_strips_trailing_one() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state(
        "media_player.tv",
        "on",
        json!({"source_list": ["Game Console", "hdmi"]}),
    );

    run(
        &config,
        request(
            "Alexa.InputController",
            "SelectInput",
            "media_player.tv",
            json!({"input": "HDMI 1"}),
        ),
    )
    .await
    .unwrap();
    assert_eq!(calls(&store).await[0].2["source"], json!("hdmi"));

    let err = run(
        &config,
        request(
            "Alexa.InputController",
            "SelectInput",
            "media_player.tv",
            json!({"input": "DVD"}),
        ),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AlexaError::InvalidValue(_)));
}

#[tokio::test]
async fn test_seek_clamps_to_duration() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state(
        "media_player.tv",
        "playing",
        json!({"media_position": 100, "media_duration": 120}),
    );
    store.set_state("media_player.radio", "playing", json!({}));

    let response = run(
        &config,
        request(
            "Alexa.SeekController",
            "AdjustSeekPosition",
            "media_player.tv",
            json!({"deltaPositionMilliseconds": 30000}),
        ),
    )
    .await
    .unwrap();

    assert_eq!(calls(&store).await[0].2["seek_position"], json!(120));
    assert_eq!(response.namespace, "Alexa.SeekController");
    assert_eq!(
        response.payload["properties"][0]["value"],
        json!(120_000)
    );

    let err = run(
        &config,
        request(
            "Alexa.SeekController",
            "AdjustSeekPosition",
            "media_player.radio",
            json!({"deltaPositionMilliseconds": 30000}),
        ),
    )
    .await
    .unwrap_err();
    assert_eq!(err.error_type(), "ACTION_NOT_PERMITTED_FOR_CONTENT");
}

#[tokio::test]
async fn test_equalizer_bands_not_supported() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("media_player.tv", "on", json!({"sound_mode_list": ["movie"]}));

    let err = run(
        &config,
        request(
            "Alexa.EqualizerController",
            "SetBands",
            "media_player.tv",
            json!({}),
        ),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AlexaError::InvalidDirective(_)));

    run(
        &config,
        request(
            "Alexa.EqualizerController",
            "SetMode",
            "media_player.tv",
            json!({"mode": "MOVIE"}),
        ),
    )
    .await
    .unwrap();
    assert_eq!(calls(&store).await[0].2["sound_mode"], json!("movie"));
}

#[tokio::test]
async fn test_set_range_cover_uses_close_at_zero() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state(
        "cover.blind",
        "open",
        json!({"supported_features": 1 | 2 | 4, "current_position": 60}),
    );

    let response = run(
        &config,
        with_instance(
            request(
                "Alexa.RangeController",
                "SetRangeValue",
                "cover.blind",
                json!({"rangeValue": 0}),
            ),
            "cover.position",
        ),
    )
    .await
    .unwrap();

    assert_eq!(calls(&store).await[0].1, "close_cover");
    let property = &response.context_properties()[0];
    assert_eq!(property.instance.as_deref(), Some("cover.position"));
    assert_eq!(property.value, json!(0));
}

#[tokio::test]
async fn test_adjust_range_default_delta() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("cover.blind", "open", json!({"current_position": 50}));

    run(
        &config,
        with_instance(
            request(
                "Alexa.RangeController",
                "AdjustRangeValue",
                "cover.blind",
                json!({"rangeValueDelta": 1, "rangeValueDeltaDefault": true}),
            ),
            "cover.position",
        ),
    )
    .await
    .unwrap();

    let recorded = calls(&store).await;
    assert_eq!(recorded[0].1, "set_cover_position");
    assert_eq!(recorded[0].2["position"], json!(70));
}

#[tokio::test]
async fn test_adjust_range_vacuum_index_is_clamped() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state(
        "vacuum.robot",
        "cleaning",
        json!({"fan_speed_list": ["quiet", "standard", "turbo"], "fan_speed": "standard"}),
    );

    let response = run(
        &config,
        with_instance(
            request(
                "Alexa.RangeController",
                "AdjustRangeValue",
                "vacuum.robot",
                json!({"rangeValueDelta": 5, "rangeValueDeltaDefault": false}),
            ),
            "vacuum.fan_speed",
        ),
    )
    .await
    .unwrap();

    assert_eq!(calls(&store).await[0].2["fan_speed"], json!("turbo"));
    assert_eq!(response.context_properties()[0].value, json!(2));
}

#[tokio::test]
async fn test_range_unknown_instance() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("cover.blind", "open", json!({}));

    let err = run(
        &config,
        with_instance(
            request(
                "Alexa.RangeController",
                "SetRangeValue",
                "cover.blind",
                json!({"rangeValue": 10}),
            ),
            "cover.humidity",
        ),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AlexaError::InvalidDirective(_)));
}

#[tokio::test]
async fn test_adjust_percentage_clamps_before_tiering() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("fan.ceiling", "on", json!({"percentage": 90}));

    run(
        &config,
        request(
            "Alexa.PercentageController",
            "AdjustPercentage",
            "fan.ceiling",
            json!({"percentageDelta": 40}),
        ),
    )
    .await
    .unwrap();

    let recorded = calls(&store).await;
    assert_eq!(recorded[0].1, "set_speed");
    assert_eq!(recorded[0].2["speed"], json!("high"));
}

#[tokio::test]
async fn test_set_mode_rejects_placeholder() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("fan.ceiling", "on", json!({"preset_modes": ["auto"]}));

    let err = run(
        &config,
        with_instance(
            request(
                "Alexa.ModeController",
                "SetMode",
                "fan.ceiling",
                json!({"mode": "preset_mode.-"}),
            ),
            "fan.preset_mode",
        ),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AlexaError::InvalidValue(_)));

    let response = run(
        &config,
        with_instance(
            request(
                "Alexa.ModeController",
                "SetMode",
                "fan.ceiling",
                json!({"mode": "preset_mode.auto"}),
            ),
            "fan.preset_mode",
        ),
    )
    .await
    .unwrap();
    assert_eq!(calls(&store).await[0].2["preset_mode"], json!("auto"));
    assert_eq!(response.context_properties()[0].value, json!("preset_mode.auto"));
}

#[tokio::test]
async fn test_activate_button_presses() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("button.doorbell_chime", "unknown", json!({}));

    let response = run(
        &config,
        request("Alexa.SceneController", "Activate", "button.doorbell_chime", json!({})),
    )
    .await
    .unwrap();

    assert_eq!(response.name, "ActivationStarted");
    assert_eq!(response.payload["cause"]["type"], json!("VOICE_INTERACTION"));
    assert!(response.payload.contains_key("timestamp"));
    assert_eq!(calls(&store).await[0].1, "press");
}

#[tokio::test]
async fn test_time_hold_unsupported_domain() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("timer.tea", "active", json!({}));
    store.set_state("switch.a", "on", json!({}));

    run(&config, request("Alexa.TimeHoldController", "Hold", "timer.tea", json!({})))
        .await
        .unwrap();
    assert_eq!(calls(&store).await[0].1, "pause");

    let err = run(
        &config,
        request("Alexa.TimeHoldController", "Hold", "switch.a", json!({})),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AlexaError::InvalidDirective(_)));
}

#[tokio::test]
async fn test_initialize_camera_streams() {
    let (store, config) = setup(SmartHomeSettings {
        external_url: Some("https://home.example.com/".into()),
        ..Default::default()
    });
    store.set_state(
        "camera.porch",
        "streaming",
        json!({
            "supported_features": 2,
            "stream_source": "/api/hls/abc/master_playlist.m3u8",
            "entity_picture": "/api/camera_proxy/camera.porch?token=xyz",
        }),
    );

    let response = run(
        &config,
        request(
            "Alexa.CameraStreamController",
            "InitializeCameraStreams",
            "camera.porch",
            json!({"cameraStreams": [{"protocol": "HLS"}]}),
        ),
    )
    .await
    .unwrap();

    assert_eq!(response.namespace, "Alexa.CameraStreamController");
    assert_eq!(response.name, "Response");
    assert_eq!(
        response.payload["cameraStreams"][0]["uri"],
        "https://home.example.com/api/hls/abc/master_playlist.m3u8"
    );
    assert_eq!(response.payload["cameraStreams"][0]["protocol"], "HLS");
    assert_eq!(
        response.payload["imageUri"],
        "https://home.example.com/api/camera_proxy/camera.porch?token=xyz"
    );
}

#[tokio::test]
async fn test_initialize_camera_streams_without_https() {
    let (store, config) = setup(SmartHomeSettings {
        external_url: Some("http://home.example.com".into()),
        ..Default::default()
    });
    store.set_state(
        "camera.porch",
        "streaming",
        json!({"supported_features": 2, "stream_source": "/api/hls/abc"}),
    );

    let err = run(
        &config,
        request(
            "Alexa.CameraStreamController",
            "InitializeCameraStreams",
            "camera.porch",
            json!({}),
        ),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AlexaError::InvalidValue(_)));
}

#[tokio::test]
async fn test_set_mode_humidifier_and_remote() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state(
        "humidifier.bedroom",
        "on",
        json!({"supported_features": 1, "available_modes": ["auto", "sleep"]}),
    );
    store.set_state(
        "remote.living_room",
        "on",
        json!({"supported_features": 4, "activity_list": ["TV", "Music"]}),
    );

    run(
        &config,
        with_instance(
            request(
                "Alexa.ModeController",
                "SetMode",
                "humidifier.bedroom",
                json!({"mode": "mode.sleep"}),
            ),
            "humidifier.mode",
        ),
    )
    .await
    .unwrap();
    let response = run(
        &config,
        with_instance(
            request(
                "Alexa.ModeController",
                "SetMode",
                "remote.living_room",
                json!({"mode": "activity.Music"}),
            ),
            "remote.activity",
        ),
    )
    .await
    .unwrap();

    let recorded = calls(&store).await;
    assert_eq!(recorded[0].0, "humidifier");
    assert_eq!(recorded[0].1, "set_mode");
    assert_eq!(recorded[0].2["mode"], json!("sleep"));
    assert_eq!(recorded[1].0, "remote");
    assert_eq!(recorded[1].1, "turn_on");
    assert_eq!(recorded[1].2["activity"], json!("Music"));
    assert_eq!(response.context_properties()[0].value, json!("activity.Music"));

    let err = run(
        &config,
        with_instance(
            request(
                "Alexa.ModeController",
                "SetMode",
                "remote.living_room",
                json!({"mode": "activity.Games"}),
            ),
            "remote.activity",
        ),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AlexaError::InvalidValue(_)));
}

#[tokio::test]
async fn test_set_mode_valve_state() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("valve.garden", "closed", json!({"supported_features": 1 | 2}));

    for (mode, service) in [("state.open", "open_valve"), ("state.closed", "close_valve")] {
        run(
            &config,
            with_instance(
                request(
                    "Alexa.ModeController",
                    "SetMode",
                    "valve.garden",
                    json!({"mode": mode}),
                ),
                "valve.state",
            ),
        )
        .await
        .unwrap();
        assert_eq!(calls(&store).await.last().unwrap().1, service);
    }
}

#[tokio::test]
async fn test_valve_stop_toggle() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("valve.main", "opening", json!({"supported_features": 8}));

    let response = run(
        &config,
        with_instance(
            request("Alexa.ToggleController", "TurnOn", "valve.main", json!({})),
            "valve.stop",
        ),
    )
    .await
    .unwrap();
    assert_eq!(calls(&store).await[0].1, "stop_valve");
    assert_eq!(response.context_properties()[0].value, json!("ON"));

    let err = run(
        &config,
        with_instance(
            request("Alexa.ToggleController", "TurnOff", "valve.main", json!({})),
            "valve.stop",
        ),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AlexaError::InvalidDirective(_)));
    assert_eq!(calls(&store).await.len(), 1);
}

#[tokio::test]
async fn test_set_range_humidity_and_valve() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("humidifier.bedroom", "on", json!({"humidity": 40}));
    store.set_state("valve.main", "open", json!({"supported_features": 1 | 2 | 4}));

    let set = |entity_id: &str, instance: &str, value: i64| {
        with_instance(
            request(
                "Alexa.RangeController",
                "SetRangeValue",
                entity_id,
                json!({"rangeValue": value}),
            ),
            instance,
        )
    };
    run(&config, set("humidifier.bedroom", "humidifier.humidity", 55))
        .await
        .unwrap();
    run(&config, set("valve.main", "valve.position", 100)).await.unwrap();
    run(&config, set("valve.main", "valve.position", 30)).await.unwrap();

    let recorded = calls(&store).await;
    assert_eq!(recorded[0].1, "set_humidity");
    assert_eq!(recorded[0].2["humidity"], json!(55));
    assert_eq!(recorded[1].1, "open_valve");
    assert_eq!(recorded[2].1, "set_valve_position");
    assert_eq!(recorded[2].2["position"], json!(30));
}

#[tokio::test]
async fn test_adjust_range_humidity_is_bounded() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state(
        "humidifier.bedroom",
        "on",
        json!({"humidity": 50, "min_humidity": 30, "max_humidity": 60}),
    );

    let response = run(
        &config,
        with_instance(
            request(
                "Alexa.RangeController",
                "AdjustRangeValue",
                "humidifier.bedroom",
                json!({"rangeValueDelta": 3, "rangeValueDeltaDefault": true}),
            ),
            "humidifier.humidity",
        ),
    )
    .await
    .unwrap();

    // 3 default steps of 5 from 50, capped at max_humidity
    assert_eq!(calls(&store).await[0].2["humidity"], json!(60));
    assert_eq!(response.context_properties()[0].value, json!(60));

    // Off humidifiers have no target humidity to adjust from
    store.set_state("humidifier.bedroom", "off", json!({}));
    let err = run(
        &config,
        with_instance(
            request(
                "Alexa.RangeController",
                "AdjustRangeValue",
                "humidifier.bedroom",
                json!({"rangeValueDelta": 1, "rangeValueDeltaDefault": false}),
            ),
            "humidifier.humidity",
        ),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AlexaError::InvalidValue(_)));
}

#[tokio::test]
async fn test_adjust_range_valve_closes_at_zero() {
    let (store, config) = setup(SmartHomeSettings::default());
    store.set_state("valve.main", "open", json!({"current_position": 30}));

    run(
        &config,
        with_instance(
            request(
                "Alexa.RangeController",
                "AdjustRangeValue",
                "valve.main",
                json!({"rangeValueDelta": -2, "rangeValueDeltaDefault": true}),
            ),
            "valve.position",
        ),
    )
    .await
    .unwrap();

    assert_eq!(calls(&store).await[0].1, "close_valve");
}
