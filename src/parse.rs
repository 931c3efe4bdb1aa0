use std::io;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError{
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("unable to turn default settings into json")]
    Serialize(#[source] serde_json::Error),
    #[error("{path} is not valid settings json")]
    Json{
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error
    }
}

/// Reads settings from a json file, or falls back to `T::default()` when no
/// file is given. The json value is returned as well so it can be written
/// into output files.
pub fn parse<P, T>(file: Option<P>) -> Result<(T, Value), ConfigError>
where P: AsRef<Utf8Path>,
    T: Default + Serialize + DeserializeOwned
{
    match file {
        None => {
            let example = T::default();
            let json = serde_json::to_value(&example)
                .map_err(ConfigError::Serialize)?;
            info!("no json given, using defaults: {json}");
            Ok((example, json))
        },
        Some(path) => {
            let path = path.as_ref();
            let content = fs_err::read_to_string(path)?;
            let to_err = |source: serde_json::Error| ConfigError::Json { path: path.to_owned(), source };
            let json: Value = serde_json::from_str(&content)
                .map_err(to_err)?;
            let settings = serde_json::from_value(json.clone())
                .map_err(to_err)?;
            Ok((settings, json))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::HarnessSettings;

    fn temp_file(name: &str, content: &str) -> Utf8PathBuf
    {
        let dir = Utf8PathBuf::from_path_buf(std::env::temp_dir())
            .expect("temp dir is utf8");
        let path = dir.join(format!("mt_queue_demo_{}_{name}", std::process::id()));
        fs_err::write(&path, content).unwrap();
        path
    }

    #[test]
    fn no_file_gives_defaults()
    {
        let (settings, json): (HarnessSettings, _) = parse(None::<&Utf8Path>).unwrap();
        assert_eq!(settings, HarnessSettings::default());
        assert_eq!(json["producers"], 2);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults()
    {
        let path = temp_file("partial.json", r#"{"producers": 7, "seed": 9}"#);
        let (settings, json): (HarnessSettings, _) = parse(Some(&path)).unwrap();
        assert_eq!(settings.producers, 7);
        assert_eq!(settings.seed, 9);
        assert_eq!(settings.consumers, 2);
        assert_eq!(json["seed"], 9);
        fs_err::remove_file(path).unwrap();
    }

    #[test]
    fn broken_json_is_reported()
    {
        let path = temp_file("broken.json", r#"{"producers": "#);
        let res: Result<(HarnessSettings, _), _> = parse(Some(&path));
        assert!(matches!(res, Err(ConfigError::Json { .. })));
        fs_err::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file_is_an_io_error()
    {
        let res: Result<(HarnessSettings, _), _> = parse(Some("/does/not/exist.json"));
        assert!(matches!(res, Err(ConfigError::Io(_))));
    }

    #[derive(Default, serde::Deserialize)]
    struct Opaque;

    impl Serialize for Opaque
    {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error>
        {
            Err(serde::ser::Error::custom("cannot be written"))
        }
    }

    #[test]
    fn unserializable_defaults_are_not_io_errors()
    {
        let res: Result<(Opaque, _), _> = parse(None::<&Utf8Path>);
        assert!(matches!(res, Err(ConfigError::Serialize(_))));
    }
}
