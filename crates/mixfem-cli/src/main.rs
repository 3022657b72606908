use std::path::{Path, PathBuf};
use std::process::ExitCode;

use mixfem_solver::{
    BackendKind, BatchStrategy, Boundary, BoundaryConditions, GaussLegendre, Job, Mesh, NeoHooke,
    NewtonConfig, NewtonResults, Region, ResultFields, ResultStatistics, SolidBody, SolverError,
    ThreeFieldVariation,
};
use serde::{Deserialize, Serialize};

/// Block compression job: symmetry on `X = 0`, `Y = 0`, `Z = 0` and a
/// prescribed vertical displacement on the top face.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct JobConfig {
    /// Block extents along x, y and z
    extent: [f64; 3],
    /// Nodes per axis
    nodes: [usize; 3],
    /// Shear modulus
    mu: f64,
    /// Bulk modulus
    bulk: f64,
    /// Prescribed displacement of the top face
    displacement: f64,
    /// Number of load increments
    increments: usize,
    /// Gauss points per axis
    quadrature_order: usize,
    solver: BackendKind,
    newton: NewtonConfig,
    strategy: BatchStrategy,
    output: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            extent: [2.0, 2.0, 1.0],
            nodes: [10, 10, 5],
            mu: 1.0,
            bulk: 5000.0,
            displacement: -0.1,
            increments: 1,
            quadrature_order: 2,
            solver: BackendKind::default(),
            newton: NewtonConfig::default(),
            strategy: BatchStrategy::default(),
            output: Some(PathBuf::from("results.json")),
        }
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    config: &'a JobConfig,
    increments: &'a [NewtonResults],
    von_mises: ResultStatistics,
    fields: &'a ResultFields,
}

fn usage() {
    eprintln!("usage: mixfem-cli run [config.json]");
    eprintln!("       mixfem-cli defaults");
}

fn load_config(path: Option<&Path>) -> Result<JobConfig, String> {
    let Some(path) = path else {
        return Ok(JobConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|err| format!("cannot read {}: {err}", path.display()))?;
    serde_json::from_str(&text).map_err(|err| format!("invalid config {}: {err}", path.display()))
}

fn run(config: &JobConfig) -> Result<bool, SolverError> {
    let mesh = Mesh::cube([0.0; 3], config.extent, config.nodes)?;
    let region = Region::new(mesh, GaussLegendre::hexahedron(config.quadrature_order)?)?;
    let top = Boundary::plane(
        "move",
        region.mesh(),
        2,
        config.extent[2],
        [false, false, true],
        config.displacement,
    );
    let boundaries = BoundaryConditions::symmetry_planes(region.mesh()).with(top);

    let model = ThreeFieldVariation::new(NeoHooke::isochoric(config.mu), config.bulk)
        .with_strategy(config.strategy);
    let mut body = SolidBody::new(&region, &model).with_strategy(config.strategy);
    let solver = config.solver.build();

    println!(
        "{} nodes, {} cells, {} dofs ({} solver)",
        region.mesh().num_points(),
        region.mesh().num_cells(),
        region.mesh().num_dofs(),
        solver.name()
    );

    let job = Job::new(&boundaries, solver.as_ref(), config.newton).with_increments(config.increments);
    let increments = job.run(&mut body)?;
    for (step, outcome) in increments.iter().enumerate() {
        println!("increment {}", step + 1);
        for report in &outcome.history {
            println!("{report}");
        }
        if let Some(cause) = &outcome.cause {
            println!("diverged: {cause}");
        }
    }
    let converged = increments.last().is_some_and(NewtonResults::converged)
        && increments.len() == config.increments;

    let fields = ResultFields::collect(&mut body, config.strategy)?;
    let von_mises = fields.von_mises_statistics();
    println!(
        "von Mises: min={:1.3e} max={:1.3e} mean={:1.3e}",
        von_mises.min, von_mises.max, von_mises.mean
    );

    if let Some(output) = &config.output {
        let summary = Summary {
            config,
            increments: &increments,
            von_mises,
            fields: &fields,
        };
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|err| SolverError::Config(format!("cannot serialize results: {err}")))?;
        std::fs::write(output, json).map_err(|err| {
            SolverError::Config(format!("cannot write {}: {err}", output.display()))
        })?;
        println!("results written to {}", output.display());
    }
    Ok(converged)
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("defaults") if args.len() == 2 => {
            match serde_json::to_string_pretty(&JobConfig::default()) {
                Ok(json) => {
                    println!("{json}");
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    eprintln!("error: {err}");
                    ExitCode::from(1)
                }
            }
        }
        Some("run") if args.len() <= 3 => {
            let config = match load_config(args.get(2).map(Path::new)) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("config error: {err}");
                    return ExitCode::from(2);
                }
            };
            match run(&config) {
                Ok(true) => ExitCode::SUCCESS,
                Ok(false) => {
                    eprintln!("job did not converge");
                    ExitCode::from(3)
                }
                Err(err) => {
                    eprintln!("error: {err}");
                    ExitCode::from(1)
                }
            }
        }
        _ => {
            usage();
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: JobConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.nodes, [10, 10, 5]);
        assert_eq!(config.bulk, 5000.0);
        assert_eq!(config.solver, BackendKind::Lu);
        assert_eq!(config.newton.max_iterations, 50);
    }

    #[test]
    fn partial_config_overrides_fields() {
        let config: JobConfig = serde_json::from_str(
            r#"{"nodes": [3, 3, 3], "solver": "cg", "newton": {"tolerance": 1e-8}, "strategy": "parallel"}"#,
        )
        .unwrap();
        assert_eq!(config.nodes, [3, 3, 3]);
        assert_eq!(config.solver, BackendKind::Cg);
        assert_eq!(config.newton.tolerance, 1e-8);
        assert_eq!(config.newton.max_iterations, 50);
        assert_eq!(config.strategy, BatchStrategy::Parallel);
    }

    #[test]
    fn small_block_converges() {
        let config = JobConfig {
            extent: [1.0; 3],
            nodes: [3, 3, 3],
            output: None,
            ..Default::default()
        };
        assert!(run(&config).unwrap());
    }
}
