use color_eyre::Result;
use color_eyre::eyre::{OptionExt, eyre};
use shaderc::{CompileOptions, Compiler, ShaderKind};
use std::{env, fs, path::Path};

fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=shaders");

    compile_shaders()?;

    Ok(())
}

/// Compiles every GLSL stage in `shaders/` to `<file>.spv` next to it, which is
/// where `RenderConfig::shader_dir` points by default.
fn compile_shaders() -> Result<()> {
    let cargo_manifest_dir = env::var("CARGO_MANIFEST_DIR")?;
    let shader_dir = Path::new(&cargo_manifest_dir).join("shaders");

    let compiler = Compiler::new().ok_or_eyre("Failed to create the shaderc compiler")?;
    let mut options = CompileOptions::new().ok_or_eyre("Failed to create shaderc options")?;
    options.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );

    for entry in fs::read_dir(&shader_dir)? {
        let path = entry?.path();

        let kind = match path.extension().and_then(|ext| ext.to_str()) {
            Some("vert") => ShaderKind::Vertex,
            Some("frag") => ShaderKind::Fragment,
            _ => continue,
        };
        let file_name = path
            .file_name()
            .ok_or_eyre("Shader file has no name")?
            .to_str()
            .ok_or_eyre("Shader file name is not valid UTF-8")?;

        let source = fs::read_to_string(&path)?;
        let artifact = compiler
            .compile_into_spirv(&source, kind, file_name, "main", Some(&options))
            .map_err(|e| eyre!("Failed to compile {file_name}: {e}"))?;
        if artifact.get_num_warnings() > 0 {
            println!("cargo:warning={file_name}: {}", artifact.get_warning_messages());
        }

        fs::write(shader_dir.join(format!("{file_name}.spv")), artifact.as_binary_u8())?;
    }

    Ok(())
}
