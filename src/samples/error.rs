// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;
use std::path::Path;

use crate::audio::sample_source::SampleSourceError;
use crate::audio::DeviceError;

/// The category of a failure, shared by returned errors and error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The file could not be opened.
    NotFound,
    /// The file could not be decoded as audio.
    DecodeError,
    /// No sample is loaded under the name.
    NotLoaded,
    /// A sample is already loaded under the name.
    AlreadyLoaded,
    /// The output device failed.
    DeviceError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::DecodeError => "decode error",
            ErrorKind::NotLoaded => "not loaded",
            ErrorKind::AlreadyLoaded => "already loaded",
            ErrorKind::DeviceError => "device error",
        };
        write!(f, "{}", kind)
    }
}

/// Errors returned by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum SamplePlayerError {
    #[error("unable to open {path}: {reason}")]
    NotFound { path: String, reason: String },

    #[error("unable to decode {path}: {reason}")]
    DecodeError { path: String, reason: String },

    #[error("no sample loaded with name {0}")]
    NotLoaded(String),

    #[error("a sample is already loaded with name {0}")]
    AlreadyLoaded(String),

    #[error("audio device error: {0}")]
    DeviceError(#[from] DeviceError),
}

impl SamplePlayerError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SamplePlayerError::NotFound { .. } => ErrorKind::NotFound,
            SamplePlayerError::DecodeError { .. } => ErrorKind::DecodeError,
            SamplePlayerError::NotLoaded(_) => ErrorKind::NotLoaded,
            SamplePlayerError::AlreadyLoaded(_) => ErrorKind::AlreadyLoaded,
            SamplePlayerError::DeviceError(_) => ErrorKind::DeviceError,
        }
    }

    /// Classifies a failure to load the file at `path`. Filesystem failures are NotFound,
    /// everything else is a DecodeError.
    pub fn from_load(path: &Path, err: SampleSourceError) -> SamplePlayerError {
        let path = path.display().to_string();
        match err {
            SampleSourceError::IoError(e) => SamplePlayerError::NotFound {
                path,
                reason: e.to_string(),
            },
            other => SamplePlayerError::DecodeError {
                path,
                reason: other.to_string(),
            },
        }
    }
}
