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
/// Error types for sample source operations
#[derive(Debug, thiserror::Error)]
pub enum SampleSourceError {
    /// The file could not be opened or read at the filesystem level.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The container or codec was recognized but decoding failed.
    #[error("Audio file error: {0}")]
    AudioError(#[from] symphonia::core::errors::Error),

    /// The file is not audio we know how to decode.
    #[error("Unsupported audio: {0}")]
    Unsupported(String),

    /// The file decoded cleanly but held no audio frames.
    #[error("No audio frames in {0}")]
    Empty(String),

    /// The caller passed a frame buffer that doesn't match the source.
    #[error("Sample conversion failed for {0}")]
    SampleConversionFailed(String),
}
