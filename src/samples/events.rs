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

use super::error::{ErrorKind, SamplePlayerError};
use crate::audio::OutputRoute;

/// A failure that happened outside of any single operation, or a copy of one that did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub reason: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> EngineError {
        EngineError {
            kind,
            reason: reason.into(),
        }
    }
}

impl From<&SamplePlayerError> for EngineError {
    fn from(err: &SamplePlayerError) -> Self {
        EngineError::new(err.kind(), err.to_string())
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

/// Events published by the engine to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Something went wrong.
    Error(EngineError),
    /// Playback moved to another output.
    RouteChanged(OutputRoute),
    /// A one-shot voice played to its end.
    SampleFinished { name: String },
}
