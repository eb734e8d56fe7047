//! Compute shader sources and SPIR-V loading.
//!
//! The denoiser shader is normally shipped as a precompiled `.spv` file and
//! loaded by path. In-memory SPIR-V is accepted as well, and with the
//! `wgsl-shaders` feature WGSL source is compiled through naga.

use std::path::{Path, PathBuf};

use crate::error::{DenoiseError, DenoiseResult};

/// SPIR-V magic number (first word of every module).
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Default path of the precompiled denoiser shader.
pub const DEFAULT_SHADER_PATH: &str = "Denoiser.comp.spv";

/// Where a compute shader's code comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderSource {
    /// Precompiled SPIR-V file.
    SpirvFile(PathBuf),
    /// SPIR-V words already in memory.
    Spirv(Vec<u32>),
    /// WGSL source compiled to SPIR-V at build time.
    #[cfg(feature = "wgsl-shaders")]
    Wgsl(String),
}

impl Default for ShaderSource {
    fn default() -> Self {
        Self::SpirvFile(PathBuf::from(DEFAULT_SHADER_PATH))
    }
}

impl ShaderSource {
    /// Short description for log messages.
    pub fn describe(&self) -> String {
        match self {
            Self::SpirvFile(path) => path.display().to_string(),
            Self::Spirv(words) => format!("<{} SPIR-V words>", words.len()),
            #[cfg(feature = "wgsl-shaders")]
            Self::Wgsl(source) => format!("<{} bytes of WGSL>", source.len()),
        }
    }

    /// Produce SPIR-V words for the compute entry point `entry_point`.
    pub fn load(&self, entry_point: &str) -> DenoiseResult<Vec<u32>> {
        match self {
            Self::SpirvFile(path) => load_spirv_file(path),
            Self::Spirv(words) => {
                check_magic(words).map_err(|reason| DenoiseError::ShaderLoadFailed {
                    path: PathBuf::from("<memory>"),
                    reason,
                })?;
                Ok(words.clone())
            }
            #[cfg(feature = "wgsl-shaders")]
            Self::Wgsl(source) => compile_wgsl(source, entry_point),
        }
        .inspect(|words| {
            log::debug!(
                "Loaded shader {} ({} words, entry '{}')",
                self.describe(),
                words.len(),
                entry_point
            );
        })
    }
}

/// Read a SPIR-V file from disk.
pub fn load_spirv_file(path: &Path) -> DenoiseResult<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|e| DenoiseError::ShaderLoadFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_spirv(&bytes).map_err(|reason| DenoiseError::ShaderLoadFailed {
        path: path.to_path_buf(),
        reason,
    })
}

/// Convert raw bytes into SPIR-V words.
///
/// Files written on a machine of the other endianness are byte-swapped.
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>, String> {
    if bytes.is_empty() {
        return Err("file is empty".to_string());
    }
    if bytes.len() % 4 != 0 {
        return Err(format!(
            "length {} is not a multiple of 4 bytes",
            bytes.len()
        ));
    }

    let mut words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    if words[0] == SPIRV_MAGIC.swap_bytes() {
        for word in &mut words {
            *word = word.swap_bytes();
        }
    }
    check_magic(&words)?;
    Ok(words)
}

fn check_magic(words: &[u32]) -> Result<(), String> {
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(()),
        Some(other) => Err(format!("bad SPIR-V magic number {other:#010x}")),
        None => Err("module is empty".to_string()),
    }
}

/// Compile WGSL source to SPIR-V for the given compute entry point.
#[cfg(feature = "wgsl-shaders")]
pub fn compile_wgsl(source: &str, entry_point: &str) -> DenoiseResult<Vec<u32>> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| DenoiseError::ShaderCompilationFailed(format!("WGSL parse error: {e}")))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator
        .validate(&module)
        .map_err(|e| DenoiseError::ShaderCompilationFailed(format!("Validation error: {e}")))?;

    if !module
        .entry_points
        .iter()
        .any(|ep| ep.name == entry_point && ep.stage == naga::ShaderStage::Compute)
    {
        return Err(DenoiseError::ShaderCompilationFailed(format!(
            "Compute entry point '{}' not found",
            entry_point
        )));
    }

    let options = naga::back::spv::Options {
        lang_version: (1, 3),
        flags: naga::back::spv::WriterFlags::empty(),
        capabilities: None,
        bounds_check_policies: naga::proc::BoundsCheckPolicies::default(),
        binding_map: Default::default(),
        debug_info: None,
        zero_initialize_workgroup_memory: naga::back::spv::ZeroInitializeWorkgroupMemoryMode::None,
    };

    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: naga::ShaderStage::Compute,
        entry_point: entry_point.to_string(),
    };

    naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options)).map_err(|e| {
        DenoiseError::ShaderCompilationFailed(format!("SPIR-V generation error: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_ne_bytes()).collect()
    }

    #[test]
    fn test_parse_native_endian() {
        let words = [SPIRV_MAGIC, 0x0001_0300, 0, 8, 0];
        assert_eq!(parse_spirv(&module_bytes(&words)).unwrap(), words);
    }

    #[test]
    fn test_parse_swapped_endian() {
        let words = [SPIRV_MAGIC, 0x0001_0300, 7];
        let swapped: Vec<u32> = words.iter().map(|w| w.swap_bytes()).collect();
        assert_eq!(parse_spirv(&module_bytes(&swapped)).unwrap(), words);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_spirv(&[]).is_err());
        assert!(parse_spirv(&[0x03, 0x02, 0x23]).is_err());
        assert!(parse_spirv(&module_bytes(&[0xdead_beef, 1])).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_spirv_file(Path::new("does/not/exist.spv")).unwrap_err();
        match err {
            DenoiseError::ShaderLoadFailed { path, .. } => {
                assert_eq!(path, PathBuf::from("does/not/exist.spv"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_default_source() {
        assert_eq!(
            ShaderSource::default(),
            ShaderSource::SpirvFile(PathBuf::from("Denoiser.comp.spv"))
        );
    }

    #[test]
    fn test_in_memory_source() {
        let words = vec![SPIRV_MAGIC, 0x0001_0000];
        assert_eq!(ShaderSource::Spirv(words.clone()).load("main").unwrap(), words);
        assert!(ShaderSource::Spirv(vec![1, 2]).load("main").is_err());
    }

    #[cfg(feature = "wgsl-shaders")]
    #[test]
    fn test_compile_wgsl() {
        let source = r#"
            @compute @workgroup_size(16, 16, 1)
            fn main(@builtin(global_invocation_id) id: vec3<u32>) {}
        "#;
        let words = compile_wgsl(source, "main").unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);
        assert!(matches!(
            compile_wgsl(source, "missing"),
            Err(DenoiseError::ShaderCompilationFailed(_))
        ));
    }
}
