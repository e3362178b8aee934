//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::{fs::read_to_string, path::Path};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable ({}) is not set", crate::SW_ROOT_ENV_VAR)]
    SwRootNotSet,

    #[error("Cannot load the parmeter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file
///
/// The file path is relative to the `params` directory under the software
/// root.
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    let mut path = crate::get_sw_root().map_err(|_| LoadError::SwRootNotSet)?;
    path.push("params");
    path.push(param_file_path);

    load_path(path)
}

/// Load a parameter file from an explicit path.
pub fn load_path<P, F>(path: F) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    F: AsRef<Path>,
{
    let params_str = read_to_string(path).map_err(LoadError::FileLoadError)?;

    from_str(&params_str)
}

/// Parse parameters from a TOML string.
pub fn from_str<P>(params_str: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    toml::from_str(params_str).map_err(LoadError::DeserialiseError)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Dummy {
        speed: f64,
        #[serde(default)]
        name: String,
    }

    #[test]
    fn test_from_str() {
        let p: Dummy = from_str("speed = 2.5\nname = \"base\"").unwrap();
        assert_eq!(p.speed, 2.5);
        assert_eq!(p.name, "base");

        let p: Dummy = from_str("speed = 1.0").unwrap();
        assert_eq!(p.name, "");

        assert!(matches!(
            from_str::<Dummy>("speed = \"fast\""),
            Err(LoadError::DeserialiseError(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_path::<Dummy, _>("/this/path/does/not/exist.toml"),
            Err(LoadError::FileLoadError(_))
        ));
    }
}
