/*!
Model Description
=================

This model description follows the ODD (Overview, Design concept, Details)
protocol (Grimm et al., 2006; Grimm et al., 2010). As for the dispersal model
it grew out of, the source code is the model description: sections of the
protocol are documentation comments attached to the code that implements them.

# 1. Purpose

The model is a spatial variant of the El Farol Bar problem (Arthur 1994), a
congestion game. A population of agents on a toroidal grid repeatedly decides
whether to go to a bar. Going is only worth it when the bar is not crowded, and
staying at home is only worth it when it is. No agent knows what the others are
going to do, so there is no pure strategy that is right for everybody.

Agents do not reason about the game. Each agent has a propensity to attend and
adapts it by copying, a little at a time, from a neighbour who did better in
the recent past. The research question is how a population started far from
equilibrium, with half the agents going almost always and half going rarely,
converges (or segregates) under such purely local imitation. The companion
analysis (see [`analysis`]) tracks this through the entropy of the population's
propensity distribution over time.

 */

// Load useful modules

use serde_derive::{Deserialize, Serialize};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::convert::TryFrom;
use std::fs::File;
use std::io::Write;
use tracing::{debug, info, warn};

pub mod analysis;
pub mod argparse;
mod debug;
pub mod error;
pub mod grid;
pub mod trace;
pub mod util;


pub use error::{Error, Result};
use submodels::parameters::Parameters;
use trace::TraceWriter;

/**

# 2. Entities, state variables, and scales

The model consists of agents on a square grid in discrete time. The unit of time
is an iteration, consisting of a fixed number of rounds of play followed by one
adaptation step.

 */
pub type Iteration = u32;

/**
## 2.1 Grid

The `S × S` grid wraps around on both axes, so that every agent has the same
eight neighbours in its Moore neighbourhood and there are no edge effects.
Agents are identified by their grid index `row * S + col`.

 */
pub use grid::Torus;

/**
## 2.2 Agents

The only evolving trait of an agent is its propensity, the probability with
which it attends the bar in a round. Propensities are always between 0 and 1.

 */
pub type Propensity = f64;

/**
Payoffs are binary: 1 for having made the right call in a round, 0 otherwise.
Every agent remembers the payoffs of the rounds of the current iteration, and
nothing older.

 */
pub type Payoff = u8;

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoffWindow {
    pub payoffs: Vec<Payoff>,
}

impl PayoffWindow {
    pub fn new(rounds: usize) -> PayoffWindow {
        PayoffWindow {
            payoffs: vec![0; rounds],
        }
    }

    pub fn record(&mut self, round: usize, payoff: Payoff) {
        self.payoffs[round] = payoff;
    }

    pub fn mean(&self) -> f64 {
        self.payoffs.iter().map(|&x| x as f64).sum::<f64>() / self.payoffs.len() as f64
    }
}

/**
An agent, as seen from the outside: its place on the grid and its current
state. The state itself lives in [`State`], one vector per state variable, so
that the adaptation step can read all old propensities while writing the new
ones into a second buffer.

 */
pub struct Agent<'a> {
    pub index: grid::Index,
    pub row: usize,
    pub col: usize,
    pub propensity: Propensity,
    pub payoffs: &'a PayoffWindow,
}

/**
## 2.3 State

The state tracks the propensities and payoff windows of all agents, the number
of the next iteration to be simulated, and a copy of the model parameters.

 */
#[derive(Clone, Serialize, Deserialize)]
pub struct State {
    /// Propensities, indexed by grid index.
    pub propensities: Vec<Propensity>,
    /// Payoffs over the most recent iteration's rounds, indexed by grid index.
    pub payoffs: Vec<PayoffWindow>,
    /// Write buffer for the synchronous adaptation step.
    #[serde(skip)]
    next_propensities: Vec<Propensity>,
    /// The iteration about to be simulated.
    pub t: Iteration,
    /// The parameters of the model
    pub p: Parameters,
}

impl State {
    /// Construct a state with given propensities and empty payoff windows.
    pub fn new(p: Parameters, propensities: Vec<Propensity>) -> Result<State> {
        p.validate()?;
        if propensities.len() != p.grid().len() {
            return Err(Error::InvalidParameter(format!(
                "{} propensities for a grid of {} agents",
                propensities.len(),
                p.grid().len()
            )));
        }
        Ok(State {
            payoffs: vec![PayoffWindow::new(p.rounds_per_iteration); propensities.len()],
            next_propensities: Vec::with_capacity(propensities.len()),
            propensities,
            t: 0,
            p,
        })
    }

    pub fn grid(&self) -> Torus {
        self.p.grid()
    }

    pub fn agent(&self, index: grid::Index) -> Agent<'_> {
        let (row, col) = self.grid().coordinates(index);
        Agent {
            index,
            row,
            col,
            propensity: self.propensities[index],
            payoffs: &self.payoffs[index],
        }
    }

    pub fn agents(&self) -> impl Iterator<Item = Agent<'_>> {
        (0..self.propensities.len()).map(move |i| self.agent(i))
    }
}

/**
# 3. Process overview and scheduling

Iterations are strictly sequential. Within one iteration:

1. All agents play `R` rounds. In every round, each agent independently
   attends with probability equal to its propensity, and receives its payoff
   once the round's total attendance is known (Submodels 7.1 and 7.2).
2. The iteration's statistics are recorded: mean and variance of the `R`
   attendance counts, mean and median propensity.
3. Every agent's propensity is appended to the trace.
4. All agents adapt their propensities at once (Submodel 7.3).

The random source is consumed agent by agent, and for each agent round by
round, so a seeded run is fully reproducible.

 */
pub fn step<R, W>(
    s: &mut State,
    rng: &mut R,
    trace: Option<&mut TraceWriter<W>>,
) -> Result<observation::IterationStatistics>
where
    R: Rng,
    W: Write,
{
    let decisions = submodels::decision::decide(&s.propensities, s.p.rounds_per_iteration, rng);
    let attendance = submodels::payoff::play_rounds(s, &decisions);
    let statistics = observation::IterationStatistics::new(s.t, attendance, &s.propensities);
    if let Some(trace) = trace {
        trace.write_iteration(trace_index(s.t)?, s.propensities.iter().copied())?;
    }
    submodels::adaptation::adapt(s);
    Ok(statistics)
}

fn trace_index(t: Iteration) -> Result<i32> {
    i32::try_from(t).map_err(|_| {
        Error::InvalidParameter(format!("iteration {} does not fit into a trace record", t))
    })
}

/**
# 4. Design concepts

## 4.1 Basic principles

The El Farol payoff is symmetric: whichever behaviour is in the minority
relative to the crowding threshold is rewarded. If everybody has the same
propensity `θ`, attendance fluctuates around the threshold and both choices
pay off about half the time. The model asks whether local imitation finds this
mixed equilibrium, or whether the population splits into regular goers and
regular stay-at-homes.

## 4.2 Emergence

The emergent properties are the distribution of propensities (unimodal around
`θ`, or segregated), its spatial structure, and the size of attendance
fluctuations. All of them are observed, not imposed.

## 4.3 Adaptation

Agents adapt their propensity, and nothing else. The rule is imitation of
success: an agent looks at the mean payoffs of its eight neighbours over the
iteration just played, and if the best of them strictly beats its own, it moves
its propensity by a fraction `Δ` of the difference towards that neighbour's.

## 4.4 Objectives

Agents do not optimize explicitly. Mean payoff over the last `R` rounds is the
only criterion used to rank neighbours.

## 4.5 Learning

There is no memory beyond the current iteration's payoff window.

## 4.6 Sensing

Agents know their own payoffs, and their neighbours' payoffs and propensities.
They do not know the total attendance except through their payoff.

## 4.7 Interaction

Interaction is global through the shared attendance count and local through
imitation.

## 4.8 Stochasticity

Attendance decisions are Bernoulli draws; the initial assignment of high and
low propensities to agents is a uniformly random permutation. Adaptation is
deterministic given the payoffs.

## 4.9 Collectives

None.

 */
mod concepts {}

/*
# 4.10 Observation

 */
pub mod observation {
    use crate::*;
    use std::io::BufWriter;
    use std::path::Path;

    /**
    What happens to a run that cannot open its trace file: keep simulating
    without a trace, or stop before the first iteration.
    */
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum TracePolicy {
        Degrade,
        Require,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ObservationSettings {
        pub log_every: Iteration,
        pub store_every: Iteration,
        pub statefile: String,
        pub trace: String,
        pub trace_policy: TracePolicy,
        /// Continue an existing trace instead of starting a new one.
        pub append_trace: bool,
        pub results: String,
        pub detailed_results: String,
        pub final_distribution: String,
    }

    impl Default for ObservationSettings {
        fn default() -> ObservationSettings {
            ObservationSettings {
                log_every: 1000,
                store_every: 0,
                statefile: "state.json".to_string(),
                trace: "p_values.bin".to_string(),
                trace_policy: TracePolicy::Degrade,
                append_trace: false,
                results: "results.csv".to_string(),
                detailed_results: "detailed_results.csv".to_string(),
                final_distribution: "final_distribution.csv".to_string(),
            }
        }
    }

    pub fn init_logging() {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }

    /**
    For every iteration, we collect the attendance of each round, its mean and
    population variance, and the mean and median propensity before adaptation.
    The median of an even-sized population is the upper of the two middle
    values, not their average.
    */
    #[derive(Debug, Clone, PartialEq)]
    pub struct IterationStatistics {
        pub iteration: Iteration,
        pub attendance: Vec<usize>,
        pub mean_attendance: f64,
        pub variance: f64,
        pub p_mean: f64,
        pub p_median: f64,
    }

    impl IterationStatistics {
        pub fn new(
            iteration: Iteration,
            attendance: Vec<usize>,
            propensities: &[Propensity],
        ) -> IterationStatistics {
            let counts: Vec<f64> = attendance.iter().map(|&a| a as f64).collect();
            let (mean_attendance, variance) = util::mean_and_variance(&counts);
            let (p_mean, _) = util::mean_and_variance(propensities);
            IterationStatistics {
                iteration,
                attendance,
                mean_attendance,
                variance,
                p_mean,
                p_median: upper_median(propensities),
            }
        }
    }

    /// ```rust
    /// use model::observation::upper_median;
    /// assert_eq!(upper_median(&[0.4, 0.1, 0.3, 0.2]), 0.3);
    /// assert_eq!(upper_median(&[0.5, 0.1, 0.9]), 0.5);
    /// ```
    pub fn upper_median(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted[sorted.len() / 2]
    }

    /// The history of a run, kept in memory and written out when the run ends.
    #[derive(Debug, Default)]
    pub struct Observations {
        pub history: Vec<IterationStatistics>,
    }

    impl Observations {
        pub fn record(&mut self, statistics: IterationStatistics) {
            self.history.push(statistics);
        }

        pub fn write_results<W: Write>(&self, mut out: W) -> Result<()> {
            writeln!(out, "iteration,mean_attendance,variance,p_mean,p_median")?;
            for s in self.history.iter() {
                writeln!(
                    out,
                    "{},{},{},{},{}",
                    s.iteration, s.mean_attendance, s.variance, s.p_mean, s.p_median
                )?;
            }
            out.flush()?;
            Ok(())
        }

        /// One row per round, numbered consecutively across iterations.
        pub fn write_detailed_results<W: Write>(&self, mut out: W) -> Result<()> {
            writeln!(out, "round,attendance")?;
            for s in self.history.iter() {
                let first = s.iteration as usize * s.attendance.len();
                for (r, a) in s.attendance.iter().enumerate() {
                    writeln!(out, "{},{}", first + r, a)?;
                }
            }
            out.flush()?;
            Ok(())
        }

        pub fn save(&self, state: &State, o: &ObservationSettings) -> Result<()> {
            self.write_results(create(&o.results)?)?;
            info!("Results saved to {}", o.results);
            self.write_detailed_results(create(&o.detailed_results)?)?;
            info!("Detailed results saved to {}", o.detailed_results);
            write_final_distribution(state, create(&o.final_distribution)?)?;
            info!("Final distribution saved to {}", o.final_distribution);
            Ok(())
        }
    }

    pub fn write_final_distribution<W: Write>(state: &State, mut out: W) -> Result<()> {
        writeln!(out, "player_id,row,col,p_value")?;
        for a in state.agents() {
            writeln!(out, "{},{},{},{}", a.index, a.row, a.col, a.propensity)?;
        }
        out.flush()?;
        Ok(())
    }

    fn create(path: &str) -> Result<BufWriter<File>> {
        let file = File::create(Path::new(path)).map_err(|e| Error::unavailable(path, e))?;
        Ok(BufWriter::new(file))
    }

    /// Open the trace according to the settings' mode and policy. `Ok(None)`
    /// means the run goes on without a trace.
    pub fn open_trace(
        o: &ObservationSettings,
    ) -> Result<Option<TraceWriter<BufWriter<File>>>> {
        let opened = if o.append_trace {
            TraceWriter::append(&o.trace)
        } else {
            TraceWriter::create(&o.trace)
        };
        match (opened, o.trace_policy) {
            (Ok(trace), _) => Ok(Some(trace)),
            (Err(e), TracePolicy::Degrade) => {
                warn!("{}. Continuing without a propensity trace.", e);
                Ok(None)
            }
            (Err(e), TracePolicy::Require) => Err(e),
        }
    }
}

/**
# 5. Initialization

The grid is filled with agents in a deliberately far-from-equilibrium state:
exactly half of them (rounded down) start with the high propensity, the other
half with the low one. Which agents go into which half is decided by a uniformly
random permutation of the grid indices. Payoff windows start out all zero.

 */
pub fn initialization<R: Rng>(p: Parameters, rng: &mut R) -> Result<State> {
    p.validate()?;
    let n = p.grid().len();
    let mut order: Vec<grid::Index> = (0..n).collect();
    order.shuffle(rng);

    let mut propensities = vec![p.low_propensity; n];
    for &i in order.iter().take(n / 2) {
        propensities[i] = p.high_propensity;
    }
    State::new(p, propensities)
}

/// The random source of a run: reproducible when seeded, fresh from the
/// operating system otherwise.
pub fn random_source(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/**
# 6. Input Data

The model does not use input data.

# 7. Submodels

 */
pub mod submodels {
    /**
    ## 7.1 Decision

    Each agent attends each round with probability equal to its propensity,
    independently of everybody else and of its own other rounds. The
    propensity stays fixed for all rounds of an iteration.

     */
    pub mod decision {
        use crate::Propensity;
        use rand::Rng;

        pub fn attends<R: Rng>(p: Propensity, rng: &mut R) -> bool {
            rng.gen::<f64>() < p
        }

        /// All decisions of one iteration, indexed `[agent][round]`.
        pub fn decide<R: Rng>(
            propensities: &[Propensity],
            rounds: usize,
            rng: &mut R,
        ) -> Vec<Vec<bool>> {
            propensities
                .iter()
                .map(|&p| (0..rounds).map(|_| attends(p, rng)).collect())
                .collect()
        }
    }

    /**
    ## 7.2 Payoff

    The bar is crowded when at least `⌊θ·N⌋` agents attend. Attending an
    uncrowded bar pays 1, as does staying home when the bar is crowded. The
    other two outcomes pay 0.

    ```rust
    use model::submodels::payoff::payoff;
    // 2 of 4 agents at threshold 2: crowded
    assert_eq!(payoff(true, 2, 2), 0);
    assert_eq!(payoff(false, 2, 2), 1);
    assert_eq!(payoff(true, 1, 2), 1);
    assert_eq!(payoff(false, 1, 2), 0);
    ```

     */
    pub mod payoff {
        use crate::{Payoff, State};

        pub fn is_crowded(total_attendance: usize, threshold: usize) -> bool {
            total_attendance >= threshold
        }

        pub fn payoff(attended: bool, total_attendance: usize, threshold: usize) -> Payoff {
            if attended != is_crowded(total_attendance, threshold) {
                1
            } else {
                0
            }
        }

        /// Resolve every round of an iteration from the agents' decisions
        /// (indexed `[agent][round]`), filling in the payoff windows. Returns
        /// the attendance of each round.
        pub fn play_rounds(s: &mut State, decisions: &[Vec<bool>]) -> Vec<usize> {
            let threshold = s.p.crowding_threshold();
            (0..s.p.rounds_per_iteration)
                .map(|round| {
                    let attendance = decisions.iter().filter(|d| d[round]).count();
                    for (window, d) in s.payoffs.iter_mut().zip(decisions.iter()) {
                        window.record(round, payoff(d[round], attendance, threshold));
                    }
                    attendance
                })
                .collect()
        }
    }

    /**
    ## 7.3 Adaptation

    After the rounds, every agent compares its mean payoff with those of its
    eight neighbours. The first neighbour (in row-major order) with the highest
    mean payoff is the agent's model, but only if it did strictly better than
    the agent itself. The agent then moves its propensity by `Δ` times the
    difference towards the model's propensity, and clamps the result to the
    unit interval.

    All agents adapt simultaneously: the new propensities are computed from the
    old ones into a second buffer, which then replaces the old one.

     */
    pub mod adaptation {
        use crate::grid::{Index, Torus};
        use crate::util::clamp_probability;
        use crate::{Propensity, State};

        pub fn best_neighbor(grid: &Torus, index: Index, mean_payoffs: &[f64]) -> Option<Index> {
            let mut best = None;
            let mut best_payoff = mean_payoffs[index];
            for n in grid.neighbors(index).iter() {
                if mean_payoffs[*n] > best_payoff {
                    best = Some(*n);
                    best_payoff = mean_payoffs[*n];
                }
            }
            best
        }

        /// ```rust
        /// use model::submodels::adaptation::imitate;
        /// assert!((imitate(0.25, 0.95, 0.002) - 0.25140).abs() < 1e-12);
        /// assert_eq!(imitate(0.9, 1.0, 20.0), 1.0);
        /// ```
        pub fn imitate(p: Propensity, model: Propensity, delta: f64) -> Propensity {
            clamp_probability(p + delta * (model - p))
        }

        pub fn adapt(s: &mut State) {
            let grid = s.grid();
            let mean_payoffs: Vec<f64> = s.payoffs.iter().map(|w| w.mean()).collect();

            let old = &s.propensities;
            let delta = s.p.delta;
            s.next_propensities.clear();
            s.next_propensities
                .extend((0..old.len()).map(|i| match best_neighbor(&grid, i, &mean_payoffs) {
                    None => old[i],
                    Some(n) => imitate(old[i], old[n], delta),
                }));
            std::mem::swap(&mut s.propensities, &mut s.next_propensities);
        }
    }

    pub mod parameters {
        use crate::error::{Error, Result};
        use crate::grid::Torus;
        use serde_derive::{Deserialize, Serialize};

        #[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
        pub struct Parameters {
            pub grid_side: usize,
            pub rounds_per_iteration: usize,
            pub delta: f64,
            pub crowding_fraction: f64,
            pub high_propensity: f64,
            pub low_propensity: f64,
        }

        impl Default for Parameters {
            fn default() -> Parameters {
                Parameters {
                    grid_side: 16,
                    rounds_per_iteration: 5,
                    delta: 0.002,
                    crowding_fraction: 0.6,
                    high_propensity: 0.95,
                    low_propensity: 0.25,
                }
            }
        }

        impl Parameters {
            pub fn grid(&self) -> Torus {
                Torus::new(self.grid_side)
            }

            /// ```rust
            /// let p = model::submodels::parameters::Parameters::default();
            /// assert_eq!(p.crowding_threshold(), 153);
            /// ```
            pub fn crowding_threshold(&self) -> usize {
                (self.crowding_fraction * self.grid().len() as f64) as usize
            }

            pub fn validate(&self) -> Result<()> {
                if self.grid_side == 0 {
                    return Err(Error::InvalidParameter("the grid must not be empty".into()));
                }
                if self.rounds_per_iteration == 0 {
                    return Err(Error::InvalidParameter(
                        "an iteration needs at least one round".into(),
                    ));
                }
                for (name, value) in [
                    ("delta", self.delta),
                    ("crowding fraction", self.crowding_fraction),
                    ("high propensity", self.high_propensity),
                    ("low propensity", self.low_propensity),
                ]
                .iter()
                {
                    if !(0.0..=1.0).contains(value) {
                        return Err(Error::InvalidParameter(format!(
                            "{} must be between 0 and 1, not {}",
                            name, value
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

pub fn store_state(state: &State, statefile: &str) -> Result<()> {
    let file = File::create(statefile).map_err(|e| Error::unavailable(statefile, e))?;
    serde_json::to_writer_pretty(file, state)?;
    Ok(())
}

pub fn load_state(statefile: &str) -> Result<State> {
    let file = File::open(statefile).map_err(|e| Error::unavailable(statefile, e))?;
    let State {
        propensities,
        payoffs,
        t,
        p,
        ..
    } = serde_json::from_reader(std::io::BufReader::new(file))?;
    let mut s = State::new(p, propensities)?;
    if payoffs.len() != s.payoffs.len() {
        return Err(Error::InvalidParameter(format!(
            "{} payoff windows for a grid of {} agents",
            payoffs.len(),
            s.payoffs.len()
        )));
    }
    let rounds = s.p.rounds_per_iteration;
    if let Some(w) = payoffs.iter().find(|w| w.payoffs.len() != rounds) {
        return Err(Error::InvalidParameter(format!(
            "payoff window of {} rounds, expected {}",
            w.payoffs.len(),
            rounds
        )));
    }
    s.payoffs = payoffs;
    s.t = t;
    Ok(s)
}

/// Store the state so that a resumed run can pick up from it. The trace is
/// flushed first, so that it ends on a whole record of the stored iteration.
pub fn checkpoint<W: Write>(
    state: &State,
    trace: Option<&mut TraceWriter<W>>,
    statefile: &str,
) -> Result<()> {
    if let Some(trace) = trace {
        trace.flush()?;
    }
    store_state(state, statefile)
}

/// Simulate until the iteration counter reaches `max_t`, then write the
/// tabular outputs and the final state.
pub fn run<R: Rng>(
    mut s: State,
    rng: &mut R,
    max_t: Iteration,
    o: &observation::ObservationSettings,
) -> Result<State> {
    let mut trace = observation::open_trace(o)?;
    let mut observations = observation::Observations::default();

    while s.t < max_t {
        let statistics = step(&mut s, rng, trace.as_mut())?;
        observations.record(statistics);

        if (o.log_every > 0) && (s.t % o.log_every == 0) {
            info!("Iteration {}/{}", s.t, max_t);
            debug!("{:?}", s.agents().next());
        }
        s.t += 1;
        if (o.store_every > 0) && (s.t % o.store_every == 0) {
            checkpoint(&s, trace.as_mut(), &o.statefile)?;
        }
    }

    match trace {
        None => {}
        Some(mut trace) => {
            trace.flush()?;
            info!("Propensity trace saved to {}", o.trace);
        }
    }
    observations.save(&s, o)?;
    store_state(&s, &o.statefile)?;
    info!("Ended at {:?}", s);
    Ok(s)
}
