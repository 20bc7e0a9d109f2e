// SPDX-License-Identifier: CEPL-1.0
//! SPIR-V sources for the triangle pipeline.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use ash::util::read_spv;

use crate::error::SetupError;

const EMBEDDED_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.vert.spv"));
const EMBEDDED_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.frag.spv"));

pub const VERT_FILE: &str = "triangle.vert.spv";
pub const FRAG_FILE: &str = "triangle.frag.spv";

/// Whole file as bytes; a missing or unreadable file is fatal.
pub fn read_binary_file(path: &Path) -> Result<Vec<u8>, SetupError> {
    fs::read(path).map_err(|source| SetupError::ShaderRead {
        path: path.to_owned(),
        source,
    })
}

/// Decodes bytes into aligned words, checking length and magic number.
pub fn decode_spirv(name: &str, bytes: &[u8]) -> Result<Vec<u32>, SetupError> {
    read_spv(&mut Cursor::new(bytes)).map_err(|_| SetupError::InvalidShaderBytecode(name.to_owned()))
}

#[derive(Clone, Debug)]
pub struct ShaderSource {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderSource {
    /// SPIR-V compiled by the build script.
    pub fn embedded() -> Result<Self, SetupError> {
        Ok(ShaderSource {
            vertex: decode_spirv(VERT_FILE, EMBEDDED_VERT)?,
            fragment: decode_spirv(FRAG_FILE, EMBEDDED_FRAG)?,
        })
    }

    /// `triangle.vert.spv` and `triangle.frag.spv` from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, SetupError> {
        let load = |file: &str| {
            let path = dir.join(file);
            decode_spirv(&path.display().to_string(), &read_binary_file(&path)?)
        };
        Ok(ShaderSource {
            vertex: load(VERT_FILE)?,
            fragment: load(FRAG_FILE)?,
        })
    }

    pub fn load(dir: Option<&Path>) -> Result<Self, SetupError> {
        match dir {
            Some(d) => Self::from_dir(d),
            None => Self::embedded(),
        }
    }
}
