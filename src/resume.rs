use ::argparse;
use model::observation::{init_logging, ObservationSettings};
use model::{load_state, random_source, run, Iteration};
use tracing::info;

fn main() -> Result<(), String> {
    init_logging();

    let mut o = ObservationSettings {
        statefile: "resumed.json".to_string(),
        append_trace: true,
        ..ObservationSettings::default()
    };

    let mut statefile = "state.json".to_string();
    let mut end: Iteration = 20000;
    let mut seed: Option<u64> = None;
    {
        let mut parser = argparse::ArgumentParser::new();
        parser.set_description("Resume a spatial El Farol bar simulation");
        parser.refer(&mut statefile).add_option(
            &["--resume-from"],
            argparse::Store,
            "File to read initial state from",
        );
        parser.refer(&mut end).add_option(
            &["--steps"],
            argparse::Store,
            "number of iterations to finish the simulation at (includes stored iterations)",
        );
        parser.refer(&mut seed).add_option(
            &["--seed"],
            argparse::StoreOption,
            "seed for the random source",
        );
        model::argparse::observation_options(&mut parser, &mut o);
        parser.parse_args_or_exit();
    }

    let state = load_state(&statefile).map_err(|e| e.to_string())?;
    info!("Resuming {:?} from {}", state, statefile);

    let mut rng = random_source(seed);
    run(state, &mut rng, end, &o).map_err(|e| e.to_string())?;
    Ok(())
}
