use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// File name looked up inside the configuration directory.
pub const CONFIG_FILE_NAME: &str = "silkwall.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SilkConfig {
    pub version: u32,
    #[serde(default)]
    pub field: FieldSection,
    #[serde(default)]
    pub surface: SurfaceSection,
}

/// Silk field parameters. Unset keys fall back to the renderer defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FieldSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Hex colour; malformed values are replaced by the renderer, not rejected here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_intensity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SurfaceSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backdrop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// Layer opacity in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(
        default = "default_reload_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub reload_interval: Duration,
}

impl Default for SurfaceSection {
    fn default() -> Self {
        Self {
            backdrop: None,
            fps: None,
            opacity: None,
            reload_interval: default_reload_interval(),
        }
    }
}

impl Default for SilkConfig {
    fn default() -> Self {
        Self {
            version: 1,
            field: FieldSection::default(),
            surface: SurfaceSection::default(),
        }
    }
}

fn default_reload_interval() -> Duration {
    Duration::from_millis(500)
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be finite and non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl SilkConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SilkConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Fully spelled-out configuration written by `silkwall config init`.
    pub fn template() -> Self {
        Self {
            version: 1,
            field: FieldSection {
                speed: Some(3.0),
                scale: Some(1.2),
                color: Some("#3b82f6".to_string()),
                noise_intensity: Some(1.8),
                rotation: Some(0.0),
            },
            surface: SurfaceSection {
                backdrop: Some("#000000".to_string()),
                fps: None,
                opacity: Some(1.0),
                reload_interval: default_reload_interval(),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let field = &self.field;
        if let Some(speed) = field.speed {
            if !speed.is_finite() || speed < 0.0 {
                return Err(ConfigError::Invalid("field.speed must be >= 0".into()));
            }
        }
        if let Some(scale) = field.scale {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(ConfigError::Invalid("field.scale must be > 0".into()));
            }
        }
        if let Some(intensity) = field.noise_intensity {
            if !intensity.is_finite() || intensity < 0.0 {
                return Err(ConfigError::Invalid(
                    "field.noise_intensity must be >= 0".into(),
                ));
            }
        }
        if let Some(rotation) = field.rotation {
            if !rotation.is_finite() {
                return Err(ConfigError::Invalid(
                    "field.rotation must be a finite number of radians".into(),
                ));
            }
        }

        if let Some(fps) = self.surface.fps {
            if !fps.is_finite() || fps < 0.0 {
                return Err(ConfigError::Invalid("surface.fps must be >= 0".into()));
            }
        }
        if let Some(opacity) = self.surface.opacity {
            if !(0.0..=1.0).contains(&opacity) {
                return Err(ConfigError::Invalid(
                    "surface.opacity must be within [0, 1]".into(),
                ));
            }
        }
        if self.surface.reload_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "surface.reload_interval must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
