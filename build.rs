//! Build script for rank-exchange
//!
//! Without the `mpi` feature there is nothing to compile: the crate only ships
//! the in-process local world. With it, this script locates an MPI
//! installation, compiles the C shim in `csrc/` and links libmpi.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    #[cfg(feature = "mpi")]
    mpi_shim::build();
}

#[cfg(feature = "mpi")]
mod mpi_shim {
    use std::env;
    use std::path::PathBuf;
    use std::process::Command;

    /// Compiler and linker flags for one MPI installation.
    struct MpiInstall {
        source: String,
        include_paths: Vec<PathBuf>,
        link_paths: Vec<PathBuf>,
        libs: Vec<String>,
        version: Option<String>,
    }

    pub fn build() {
        println!("cargo:rerun-if-changed=csrc/rankx.c");
        println!("cargo:rerun-if-changed=csrc/rankx.h");
        println!("cargo:rerun-if-env-changed=MPI_PKG_CONFIG");
        println!("cargo:rerun-if-env-changed=MPICC");
        println!("cargo:rerun-if-env-changed=CRAY_MPICH_DIR");

        let install = locate().unwrap_or_else(|| {
            panic!(
                "the `mpi` feature needs an MPI installation (MPICH or Open MPI); either\n\
                 - set MPI_PKG_CONFIG to its pkg-config name (e.g. 'mpich'),\n\
                 - put mpicc on PATH or point MPICC at it,\n\
                 - set CRAY_MPICH_DIR on Cray systems,\n\
                 or build without `--features mpi` to use the local world only"
            )
        });
        eprintln!("rank-exchange: using MPI from {}", install.source);

        let mut shim = cc::Build::new();
        shim.file("csrc/rankx.c")
            .include("csrc")
            .warnings(true)
            .extra_warnings(true);
        for path in &install.include_paths {
            shim.include(path);
        }
        shim.compile("rankx");

        for path in &install.link_paths {
            println!("cargo:rustc-link-search=native={}", path.display());
            // rpath so the binary loads the same libmpi it was linked against
            println!("cargo:rustc-link-arg=-Wl,-rpath,{}", path.display());
        }
        for lib in &install.libs {
            println!("cargo:rustc-link-lib={lib}");
        }
        if let Some(version) = install.version {
            println!("cargo:rustc-env=RANKX_MPI_VERSION={version}");
        }
    }

    fn locate() -> Option<MpiInstall> {
        env::var("MPI_PKG_CONFIG")
            .ok()
            .and_then(|name| from_pkg_config(&name))
            .or_else(|| ["mpich", "ompi", "mpi"].iter().find_map(|n| from_pkg_config(n)))
            .or_else(from_mpicc)
            .or_else(from_cray)
            .or_else(from_prefixes)
    }

    fn from_pkg_config(name: &str) -> Option<MpiInstall> {
        let lib = pkg_config::Config::new()
            .cargo_metadata(false)
            .probe(name)
            .ok()?;
        Some(MpiInstall {
            source: format!("pkg-config ({name})"),
            include_paths: lib.include_paths,
            link_paths: lib.link_paths,
            libs: lib.libs,
            version: Some(lib.version),
        })
    }

    fn from_mpicc() -> Option<MpiInstall> {
        let mpicc = env::var("MPICC").unwrap_or_else(|_| "mpicc".to_string());
        let output = Command::new(&mpicc).arg("-show").output().ok()?;
        if !output.status.success() {
            return None;
        }
        let mut install = parse_compiler_wrapper(&String::from_utf8_lossy(&output.stdout));
        install.source = format!("{mpicc} -show");
        Some(install)
    }

    fn from_cray() -> Option<MpiInstall> {
        let dir = PathBuf::from(env::var("CRAY_MPICH_DIR").ok()?);
        Some(MpiInstall {
            source: format!("CRAY_MPICH_DIR={}", dir.display()),
            include_paths: vec![dir.join("include")],
            link_paths: vec![dir.join("lib")],
            libs: vec!["mpi".to_string()],
            version: None,
        })
    }

    fn from_prefixes() -> Option<MpiInstall> {
        ["/usr", "/usr/local", "/opt/mpich", "/opt/openmpi"]
            .iter()
            .map(PathBuf::from)
            .find(|prefix| prefix.join("include/mpi.h").exists())
            .map(|prefix| MpiInstall {
                source: prefix.display().to_string(),
                include_paths: vec![prefix.join("include")],
                link_paths: vec![prefix.join("lib")],
                libs: vec!["mpi".to_string()],
                version: None,
            })
    }

    /// Pull `-I`, `-L` and `-l` flags out of `mpicc -show` output.
    fn parse_compiler_wrapper(output: &str) -> MpiInstall {
        let mut install = MpiInstall {
            source: String::new(),
            include_paths: Vec::new(),
            link_paths: Vec::new(),
            libs: Vec::new(),
            version: None,
        };
        for flag in output.split_whitespace() {
            if let Some(path) = flag.strip_prefix("-I") {
                install.include_paths.push(PathBuf::from(path));
            } else if let Some(path) = flag.strip_prefix("-L") {
                install.link_paths.push(PathBuf::from(path));
            } else if let Some(lib) = flag.strip_prefix("-l") {
                install.libs.push(lib.to_string());
            }
        }
        if install.libs.is_empty() {
            install.libs.push("mpi".to_string());
        }
        install
    }
}
