//! Launcher environment helpers.
//!
//! `mpiexec` and SLURM advertise each process's rank and the world size in
//! environment variables before `MPI_Init` runs. These functions read them and
//! return `None` when the process was not started by a known launcher.
//!
//! | Launcher | Rank variable | Size variable |
//! |----------|---------------|---------------|
//! | Open MPI | `OMPI_COMM_WORLD_RANK` | `OMPI_COMM_WORLD_SIZE` |
//! | MPICH / Hydra (PMI) | `PMI_RANK` | `PMI_SIZE` |
//! | SLURM `srun` | `SLURM_PROCID` | `SLURM_NTASKS` |

use std::env;

/// A launcher that assigns ranks through the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launcher {
    /// Open MPI's `mpiexec`/`mpirun`
    OpenMpi,
    /// A PMI-based launcher such as MPICH's Hydra
    Pmi,
    /// SLURM's `srun`
    Slurm,
}

impl Launcher {
    /// Detection order: MPI launchers first, since `mpiexec` inside a SLURM
    /// allocation inherits the allocation's `SLURM_*` variables.
    const ALL: [Launcher; 3] = [Launcher::OpenMpi, Launcher::Pmi, Launcher::Slurm];

    fn rank_var(self) -> &'static str {
        match self {
            Launcher::OpenMpi => "OMPI_COMM_WORLD_RANK",
            Launcher::Pmi => "PMI_RANK",
            Launcher::Slurm => "SLURM_PROCID",
        }
    }

    fn size_var(self) -> &'static str {
        match self {
            Launcher::OpenMpi => "OMPI_COMM_WORLD_SIZE",
            Launcher::Pmi => "PMI_SIZE",
            Launcher::Slurm => "SLURM_NTASKS",
        }
    }
}

/// The launcher that started this process, if any.
pub fn detect() -> Option<Launcher> {
    Launcher::ALL
        .into_iter()
        .find(|launcher| env::var(launcher.rank_var()).is_ok())
}

/// Rank the launcher assigned to this process.
pub fn world_rank() -> Option<i32> {
    parse(detect()?.rank_var())
}

/// Number of processes the launcher started.
pub fn world_size() -> Option<i32> {
    parse(detect()?.size_var())
}

/// Get the SLURM job ID.
pub fn job_id() -> Option<String> {
    env::var("SLURM_JOB_ID").ok()
}

fn parse(var: &str) -> Option<i32> {
    env::var(var).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 7] = [
        "OMPI_COMM_WORLD_RANK",
        "OMPI_COMM_WORLD_SIZE",
        "PMI_RANK",
        "PMI_SIZE",
        "SLURM_PROCID",
        "SLURM_NTASKS",
        "SLURM_JOB_ID",
    ];

    /// Everything that mutates the environment lives in one test: `set_var`
    /// and `remove_var` race with other threads reading the environment.
    #[test]
    fn launcher_env_var_parsing() {
        let saved: Vec<_> = VARS.iter().map(|v| (*v, env::var(v).ok())).collect();
        let clear = || {
            for var in VARS {
                unsafe { env::remove_var(var) };
            }
        };

        // --- nothing set ---
        clear();
        assert_eq!(detect(), None);
        assert_eq!(world_rank(), None);
        assert_eq!(world_size(), None);
        assert_eq!(job_id(), None);

        // --- srun ---
        unsafe {
            env::set_var("SLURM_PROCID", "1");
            env::set_var("SLURM_NTASKS", "2");
            env::set_var("SLURM_JOB_ID", "12345");
        }
        assert_eq!(detect(), Some(Launcher::Slurm));
        assert_eq!(world_rank(), Some(1));
        assert_eq!(world_size(), Some(2));
        assert_eq!(job_id(), Some("12345".to_string()));

        // --- mpiexec inside a SLURM allocation: Open MPI wins ---
        unsafe {
            env::set_var("OMPI_COMM_WORLD_RANK", "0");
            env::set_var("OMPI_COMM_WORLD_SIZE", "3");
        }
        assert_eq!(detect(), Some(Launcher::OpenMpi));
        assert_eq!(world_rank(), Some(0));
        assert_eq!(world_size(), Some(3));

        // --- PMI with garbage size ---
        clear();
        unsafe {
            env::set_var("PMI_RANK", "1");
            env::set_var("PMI_SIZE", "two");
        }
        assert_eq!(detect(), Some(Launcher::Pmi));
        assert_eq!(world_rank(), Some(1));
        assert_eq!(world_size(), None);

        clear();
        for (var, value) in saved {
            if let Some(value) = value {
                unsafe { env::set_var(var, value) };
            }
        }
    }
}
