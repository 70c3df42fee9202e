// SPDX-License-Identifier: CEPL-1.0
use std::io::Cursor;

use ash::util::read_spv;
use ash::vk;

use crate::error::{EngineError, Result, VkContext};

/// Name reported in compiler diagnostics for runtime fragment programs.
pub(crate) const FRAGMENT_SHADER_NAME: &str = "custom_fragment_shader";

const QUAD_VERT_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/quad.vert.spv"));

/// GLSL -> SPIR-V for fragment programs supplied at runtime.
pub(crate) struct ShaderCompiler {
    compiler: shaderc::Compiler,
}

impl ShaderCompiler {
    pub fn new() -> Result<Self> {
        let compiler = shaderc::Compiler::new()
            .map_err(|e| EngineError::CompilerUnavailable(e.to_string()))?;
        Ok(ShaderCompiler { compiler })
    }

    /// Compiles `source` as a Vulkan 1.0 fragment shader with entry point `main`.
    pub fn compile_fragment(&self, source: &str, name: &str) -> Result<Vec<u32>> {
        let mut opts = shaderc::CompileOptions::new()
            .map_err(|e| EngineError::CompilerUnavailable(e.to_string()))?;
        opts.set_target_env(
            shaderc::TargetEnv::Vulkan,
            shaderc::EnvVersion::Vulkan1_0 as u32,
        );
        opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

        let artifact = self
            .compiler
            .compile_into_spirv(source, shaderc::ShaderKind::Fragment, name, "main", Some(&opts))
            .map_err(|e| EngineError::ShaderCompile {
                name: name.to_owned(),
                message: e.to_string(),
            })?;
        Ok(artifact.as_binary().to_vec())
    }
}

/// Built-in vertex stage, compiled at build time.
pub(crate) fn quad_vertex_spirv() -> Result<Vec<u32>> {
    read_spv(&mut Cursor::new(QUAD_VERT_SPV)).map_err(EngineError::Spirv)
}

pub(crate) unsafe fn create_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: std::mem::size_of_val(code),
        ..Default::default()
    };
    device
        .create_shader_module(&ci, None)
        .context("create_shader_module")
}

/// Owned shader module.
pub(crate) struct ShaderModule {
    device: ash::Device,
    pub handle: vk::ShaderModule,
}

impl ShaderModule {
    pub unsafe fn new(device: &ash::Device, code: &[u32]) -> Result<Self> {
        Ok(ShaderModule {
            device: device.clone(),
            handle: create_module(device, code)?,
        })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.handle, None) };
    }
}
