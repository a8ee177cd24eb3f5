//! Configuration loading from files and environment variables.

use config::{Config, Environment, File};

use super::settings::AppConfig;
use crate::error::{CaptureError, CaptureResult};

/// Load configuration from `pagecut.{toml,json,yaml}` in the working
/// directory and `PAGECUT__*` environment variables
pub fn load_config() -> CaptureResult<AppConfig> {
    load_config_from("pagecut")
}

/// Load configuration from the file `base` (extension optional) and env vars
pub fn load_config_from(base: &str) -> CaptureResult<AppConfig> {
    build(base, environment())
}

fn environment() -> Environment {
    Environment::with_prefix("PAGECUT")
        .separator("__")
        .try_parsing(true)
}

/// Environment values override file values.
fn build(base: &str, environment: Environment) -> CaptureResult<AppConfig> {
    let config: AppConfig = Config::builder()
        .add_source(File::with_name(base).required(false))
        .add_source(environment)
        .build()
        .map_err(|e| CaptureError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| CaptureError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })?;

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SectionTypeSetting;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("absent");
        let config = load_config_from(base.to_str().unwrap()).unwrap();
        assert_eq!(config.capture.jpeg_quality, 80);
        assert_eq!(config.capture.margins.left, 0);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("pagecut.toml"),
            r#"
            [capture]
            section_type = "case"
            case_question_count = 3
            drag_threshold_px = 4

            [capture.margins]
            left = 12
            right = 8

            [render]
            scale = 2.0
            "#,
        )
        .unwrap();

        let base = dir.path().join("pagecut");
        let config = load_config_from(base.to_str().unwrap()).unwrap();
        assert_eq!(config.capture.section_type, SectionTypeSetting::Case);
        assert_eq!(config.capture.case_question_count, 3);
        assert_eq!(config.capture.drag_threshold_px, 4);
        assert_eq!(config.capture.margins.left, 12);
        assert_eq!(config.capture.margins.right, 8);
        assert_eq!(config.render.scale, 2.0);
        assert_eq!(config.render.max_scale, 3.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("bad.toml"),
            "[capture]\njpeg_quality = 0\n",
        )
        .unwrap();

        let base = dir.path().join("bad");
        let err = load_config_from(base.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, CaptureError::Config { .. }));
    }

    fn env(vars: &[(&str, &str)]) -> Environment {
        let vars: ::config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(vars))
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("pagecut.toml"),
            "[capture]\njpeg_quality = 70\ndrag_threshold_px = 4\n",
        )
        .unwrap();

        let base = dir.path().join("pagecut");
        let config = build(
            base.to_str().unwrap(),
            env(&[
                ("PAGECUT__CAPTURE__JPEG_QUALITY", "55"),
                ("PAGECUT__CAPTURE__MARGINS__LEFT", "9"),
                ("PAGECUT__STORAGE__PERSIST_CAPTURES", "true"),
            ]),
        )
        .unwrap();

        assert_eq!(config.capture.jpeg_quality, 55);
        assert_eq!(config.capture.margins.left, 9);
        assert_eq!(config.capture.drag_threshold_px, 4);
        assert!(config.storage.persist_captures);
    }

    #[test]
    fn test_invalid_environment_value_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("absent");
        let err = build(
            base.to_str().unwrap(),
            env(&[("PAGECUT__CAPTURE__JPEG_QUALITY", "0")]),
        )
        .unwrap_err();
        assert!(matches!(err, CaptureError::Config { .. }));
    }
}
