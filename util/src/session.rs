//! Session management
//!
//! A session is one power-on run of an executable. It owns a timestamped
//! directory under the software root which holds that run's log file.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

// Internal imports
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// A chrono format string which diplays a timestamp. See
/// https://docs.rs/chrono/0.4.11/chrono/format/strftime/index.html for more
/// information.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A struct storing information about the current session
#[derive(Clone, Debug)]
pub struct Session {
    /// The root directory for this session
    pub session_root: PathBuf,

    /// The path to the session's log file
    pub log_file_path: PathBuf,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors associated with the session module.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable ({}) is not set", crate::SW_ROOT_ENV_VAR)]
    SwRootNotSet,

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error(
        "Cannot initialise the session epoch, have you already initialised the \
         session? (conquer_once error: {0})"
    )]
    CannotInitEpoch(conquer_once::TryInitError),

    #[error("Cannot get the epoch time, did you forget to initialise the session?")]
    CannotGetEpoch,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start a new session within the given directory.
    ///
    /// This will create a new session directory named `{exec_name}_{timestamp}`
    /// inside `sessions_dir`, which is relative to the software root.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        let root = crate::get_sw_root().map_err(|_| SessionError::SwRootNotSet)?;

        Self::new_in(exec_name, root.join(sessions_dir))
    }

    /// Start a new session inside an explicit directory.
    pub fn new_in<P: Into<PathBuf>>(exec_name: &str, sessions_dir: P) -> Result<Self, SessionError> {
        SESSION_EPOCH
            .try_init_once(Utc::now)
            .map_err(SessionError::CannotInitEpoch)?;

        let timestamp = SESSION_EPOCH
            .get()
            .ok_or(SessionError::CannotGetEpoch)?
            .format(TIMESTAMP_FORMAT);

        let mut path: PathBuf = sessions_dir.into();
        path.push(format!("{}_{}", exec_name, timestamp));

        fs::create_dir_all(&path).map_err(SessionError::CannotCreateDir)?;

        let log_file_path = path.join(format!("{}.log", exec_name));

        Ok(Session {
            session_root: path,
            log_file_path,
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the number of seconds elapsed since the start of the session.
///
/// If the session has not been started yet `NAN` is returned, so that log
/// records emitted before the session exists are still printed.
pub fn get_elapsed_seconds() -> f64 {
    match SESSION_EPOCH.get() {
        Some(e) => time::duration_to_seconds(Utc::now() - *e).unwrap_or(f64::NAN),
        None => f64::NAN,
    }
}

/// Return a reference to the session's epoch.
///
/// # Panics
/// - This function will panic if the session epoch has not been
///   initialised, which is performed on creating a new Session instance.
pub fn get_epoch() -> &'static DateTime<Utc> {
    match SESSION_EPOCH.get() {
        Some(e) => e,
        None => panic!("Cannot get the session epoch!"),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_session_dirs() {
        let dir = std::env::temp_dir().join("arm_util_session_test");

        let session = Session::new_in("test_exec", &dir).unwrap();

        assert!(session.session_root.starts_with(&dir));
        assert!(session.session_root.is_dir());
        assert_eq!(
            session.log_file_path.file_name().and_then(|f| f.to_str()),
            Some("test_exec.log")
        );
        assert!(get_elapsed_seconds() >= 0.0);

        // The epoch can only be set once per process
        assert!(matches!(
            Session::new_in("test_exec", &dir),
            Err(SessionError::CannotInitEpoch(_))
        ));

        fs::remove_dir_all(&dir).ok();
    }
}
