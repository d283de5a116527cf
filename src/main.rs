use model::argparse::parse_args;
use model::observation::{init_logging, ObservationSettings};
use model::submodels::parameters::Parameters;
use model::{initialization, random_source, run, Iteration};
use tracing::info;

fn main() -> Result<(), String> {
    init_logging();

    let mut p = Parameters::default();
    let mut max_t: Iteration = 10000;
    let mut seed: Option<u64> = None;
    let mut o = ObservationSettings::default();

    {
        let parser = parse_args(&mut p, &mut max_t, &mut seed, &mut o);
        parser.parse_args_or_exit();
    }

    info!("Starting El Farol spatial simulation");
    info!(
        "Grid size: {}x{} ({} players)",
        p.grid_side,
        p.grid_side,
        p.grid().len()
    );
    info!("Rounds per iteration: {}", p.rounds_per_iteration);
    info!("Delta: {}", p.delta);

    let mut rng = random_source(seed);
    let s = initialization(p, &mut rng).map_err(|e| e.to_string())?;
    info!("Initialized");

    run(s, &mut rng, max_t, &o).map_err(|e| e.to_string())?;
    info!("Simulation completed!");
    Ok(())
}
