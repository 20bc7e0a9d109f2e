use std::{env, fs, path::PathBuf};

// Compiles shaders/triangle.{vert,frag} to SPIR-V in OUT_DIR. The vertex
// shader's inputs must match `Vertex`:
//   - binding 0, location 0: R32G32B32_SFLOAT (pos)
//   - binding 0, location 1: R32G32B32A32_SFLOAT (color)
fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let src_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("manifest dir")).join("shaders");

    let comp = shaderc::Compiler::new().expect("shaderc compiler");
    let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    for (file, kind) in [
        ("triangle.vert", shaderc::ShaderKind::Vertex),
        ("triangle.frag", shaderc::ShaderKind::Fragment),
    ] {
        let path = src_dir.join(file);
        let src = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("reading {}: {e}", path.display()));
        let spv = comp
            .compile_into_spirv(&src, kind, file, "main", Some(&opts))
            .unwrap_or_else(|e| panic!("compiling {file}: {e}"));
        fs::write(out.join(format!("{file}.spv")), spv.as_binary_u8())
            .unwrap_or_else(|e| panic!("writing {file}.spv: {e}"));
        println!("cargo:rerun-if-changed={}", path.display());
    }

    println!("cargo:rerun-if-changed=build.rs");
}
