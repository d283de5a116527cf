use crate::analysis::AnalysisSettings;
use crate::observation::{ObservationSettings, TracePolicy};
use crate::submodels::parameters::Parameters;
use crate::Iteration;
use ::argparse::{ArgumentParser, Store, StoreConst, StoreOption};

pub fn parse_args<'a>(
    p: &'a mut Parameters,
    max_t: &'a mut Iteration,
    seed: &'a mut Option<u64>,
    observation: &'a mut ObservationSettings,
) -> ArgumentParser<'a> {
    let mut parser = ArgumentParser::new();
    parser.set_description("Run a spatial El Farol bar simulation");
    parser.refer(&mut p.grid_side).add_option(
        &["--grid-side"],
        Store,
        "side length of the toroidal grid; the population is its square",
    );
    parser.refer(&mut p.rounds_per_iteration).add_option(
        &["--rounds"],
        Store,
        "rounds of play per iteration",
    );
    parser.refer(&mut p.delta).add_option(
        &["--delta"],
        Store,
        "fraction of the propensity difference an agent moves towards a better neighbour",
    );
    parser.refer(&mut p.crowding_fraction).add_option(
        &["--crowding-fraction"],
        Store,
        "fraction of the population at which the bar counts as crowded",
    );
    parser.refer(&mut p.high_propensity).add_option(
        &["--high-propensity"],
        Store,
        "initial propensity of the frequent half of the population",
    );
    parser.refer(&mut p.low_propensity).add_option(
        &["--low-propensity"],
        Store,
        "initial propensity of the infrequent half of the population",
    );
    parser.refer(max_t).add_option(
        &["--steps"],
        Store,
        "number of iterations to simulate",
    );
    parser.refer(seed).add_option(
        &["--seed"],
        StoreOption,
        "seed for the random source (default: fresh entropy on every run)",
    );
    observation_options(&mut parser, observation);
    parser
}

/// Options controlling what a run writes, shared by fresh and resumed runs.
pub fn observation_options<'a>(
    parser: &mut ArgumentParser<'a>,
    observation: &'a mut ObservationSettings,
) {
    parser.refer(&mut observation.log_every).add_option(
        &["--log-every"],
        Store,
        "period of progress logging, in iterations",
    );
    parser.refer(&mut observation.store_every).add_option(
        &["--store-every"],
        Store,
        "period of state saving, in iterations (0: only at the end)",
    );
    parser.refer(&mut observation.statefile).add_option(
        &["--statefile"],
        Store,
        "File to store state to",
    );
    parser.refer(&mut observation.trace).add_option(
        &["--trace"],
        Store,
        "binary propensity trace",
    );
    parser.refer(&mut observation.trace_policy).add_option(
        &["--require-trace"],
        StoreConst(TracePolicy::Require),
        "fail instead of running without a trace if the trace cannot be opened",
    );
    parser.refer(&mut observation.results).add_option(
        &["--results"],
        Store,
        "per-iteration summary table",
    );
    parser.refer(&mut observation.detailed_results).add_option(
        &["--detailed-results"],
        Store,
        "per-round attendance table",
    );
    parser.refer(&mut observation.final_distribution).add_option(
        &["--final-distribution"],
        Store,
        "final propensity of every agent",
    );
}

pub fn parse_analysis_args<'a>(o: &'a mut AnalysisSettings) -> ArgumentParser<'a> {
    let mut parser = ArgumentParser::new();
    parser.set_description("Compute propensity histograms and their entropy from a trace");
    parser.refer(&mut o.trace).add_option(
        &["--trace"],
        Store,
        "binary propensity trace to read",
    );
    parser.refer(&mut o.entropy).add_option(
        &["--entropy"],
        Store,
        "per-iteration entropy table to write",
    );
    parser.refer(&mut o.histogram).add_option(
        &["--histogram"],
        Store,
        "binary histogram blocks to write",
    );
    parser.refer(&mut o.num_bins).add_option(
        &["--bins"],
        Store,
        "number of equal-width propensity bins",
    );
    parser.refer(&mut o.log_every).add_option(
        &["--log-every"],
        Store,
        "period of progress logging, in iterations",
    );
    parser
}
