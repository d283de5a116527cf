/*!
Offline analysis of a propensity trace

The trace is consumed in one streaming pass. Records are grouped by runs of
equal iteration index; each group is the population snapshot of one iteration.
For every snapshot the propensities are discretized into equal-width bins over
the unit interval, the bin counts are normalized into a probability
distribution, and the Shannon entropy of that distribution is computed in bits.
 */
use crate::error::{Error, Result};
use crate::trace::{TraceReader, TraceRecord};
use itertools::Itertools;
use serde_derive::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalysisSettings {
    pub num_bins: usize,
    pub trace: String,
    pub entropy: String,
    pub histogram: String,
    pub log_every: i32,
}

impl Default for AnalysisSettings {
    fn default() -> AnalysisSettings {
        AnalysisSettings {
            num_bins: 20,
            trace: "p_values.bin".to_string(),
            entropy: "entropy_results.csv".to_string(),
            histogram: "histogram_data.bin".to_string(),
            log_every: 1000,
        }
    }
}

/// The distribution of propensities across the population at one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub iteration: i32,
    pub entropy: f64,
    pub probabilities: Vec<f64>,
}

/// The bin a propensity falls into. `1.0` lands in the last bin.
///
/// ```rust
/// use model::analysis::bin_index;
/// assert_eq!(bin_index(0.0, 20), 0);
/// assert_eq!(bin_index(0.05, 20), 1);
/// assert_eq!(bin_index(1.0, 20), 19);
/// ```
pub fn bin_index(p: f64, num_bins: usize) -> usize {
    std::cmp::min((p * num_bins as f64) as usize, num_bins - 1)
}

pub fn histogram(propensities: &[f64], num_bins: usize) -> Vec<usize> {
    let mut counts = vec![0; num_bins];
    for p in propensities {
        counts[bin_index(*p, num_bins)] += 1;
    }
    counts
}

/// Normalize bin counts by the number of samples. With no samples, every bin
/// has probability zero.
pub fn probabilities(counts: &[usize], samples: usize) -> Vec<f64> {
    if samples == 0 {
        return vec![0.0; counts.len()];
    }
    counts
        .iter()
        .map(|c| *c as f64 / samples as f64)
        .collect()
}

/// Shannon entropy in bits. Empty bins contribute nothing.
pub fn entropy(probabilities: &[f64]) -> f64 {
    probabilities
        .iter()
        .filter(|p| **p > 0.0)
        .fold(0.0, |h, p| h - p * p.log2())
}

pub fn snapshot(iteration: i32, propensities: &[f64], num_bins: usize) -> Snapshot {
    let counts = histogram(propensities, num_bins);
    let probabilities = probabilities(&counts, propensities.len());
    Snapshot {
        iteration,
        entropy: entropy(&probabilities),
        probabilities,
    }
}

/// Group a record stream by iteration and hand one snapshot per group to
/// `emit`, in the order the groups are encountered. Returns the number of
/// groups processed.
pub fn process<I, F>(records: I, num_bins: usize, mut emit: F) -> Result<usize>
where
    I: IntoIterator<Item = TraceRecord>,
    F: FnMut(Snapshot) -> Result<()>,
{
    let mut processed = 0;
    let groups = records.into_iter().group_by(|r| r.iteration);
    for (iteration, group) in &groups {
        let propensities: Vec<f64> = group.map(|r| r.p).collect();
        emit(snapshot(iteration, &propensities, num_bins))?;
        processed += 1;
    }
    Ok(processed)
}

/// Writes the entropy table and the positional histogram blocks.
pub struct SnapshotWriter<E: Write, H: Write> {
    entropy: E,
    histogram: H,
}

impl SnapshotWriter<BufWriter<File>, BufWriter<File>> {
    pub fn create(entropy: &Path, histogram: &Path) -> Result<Self> {
        let e = File::create(entropy).map_err(|err| Error::unavailable(entropy, err))?;
        let h = File::create(histogram).map_err(|err| Error::unavailable(histogram, err))?;
        SnapshotWriter::new(BufWriter::new(e), BufWriter::new(h))
    }
}

impl<E: Write, H: Write> SnapshotWriter<E, H> {
    pub fn new(mut entropy: E, histogram: H) -> Result<Self> {
        writeln!(entropy, "iteration,entropy")?;
        Ok(SnapshotWriter { entropy, histogram })
    }

    pub fn write(&mut self, s: &Snapshot) -> Result<()> {
        writeln!(self.entropy, "{},{}", s.iteration, s.entropy)?;
        for p in s.probabilities.iter() {
            bincode::serialize_into(&mut self.histogram, p)?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<(E, H)> {
        self.entropy.flush()?;
        self.histogram.flush()?;
        Ok((self.entropy, self.histogram))
    }
}

/// Run the whole analysis pass over the trace named in the settings. An
/// empty trace produces no output files at all.
pub fn analyze(o: &AnalysisSettings) -> Result<usize> {
    if o.num_bins == 0 {
        return Err(Error::InvalidParameter(
            "the number of bins must be positive".to_string(),
        ));
    }
    let mut records = TraceReader::open(&o.trace)?.peekable();
    if records.peek().is_none() {
        info!("Input trace {} is empty.", o.trace);
        return Ok(0);
    }

    let mut out = SnapshotWriter::create(Path::new(&o.entropy), Path::new(&o.histogram))?;
    let processed = process(records, o.num_bins, |s| {
        out.write(&s)?;
        if o.log_every > 0 && s.iteration % o.log_every == 0 {
            info!("Processed iteration {}", s.iteration);
        }
        Ok(())
    })?;
    out.finish()?;

    info!("Entropy data saved to {}", o.entropy);
    info!("Histogram data saved to {}", o.histogram);
    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceWriter;
    use approx::assert_abs_diff_eq;

    fn records(groups: &[(i32, &[f64])]) -> Vec<TraceRecord> {
        groups
            .iter()
            .flat_map(|(iteration, ps)| {
                ps.iter().map(move |p| TraceRecord {
                    iteration: *iteration,
                    p: *p,
                })
            })
            .collect()
    }

    #[test]
    fn two_agents_two_bins_give_one_bit() {
        let s = snapshot(0, &[0.1, 0.9], 2);
        assert_eq!(histogram(&[0.1, 0.9], 2), vec![1, 1]);
        assert_eq!(s.probabilities, vec![0.5, 0.5]);
        assert_eq!(s.entropy, 1.0);
    }

    #[test]
    fn single_bin_has_zero_entropy() {
        let s = snapshot(4, &[0.25, 0.26, 0.27, 0.29], 20);
        assert_eq!(s.entropy, 0.0);
        assert_eq!(s.probabilities.iter().filter(|p| **p > 0.0).count(), 1);
    }

    #[test]
    fn one_per_bin_has_maximal_entropy() {
        let bins = 20;
        let ps: Vec<f64> = (0..bins).map(|i| (i as f64 + 0.5) / bins as f64).collect();
        let s = snapshot(0, &ps, bins);
        assert_abs_diff_eq!(s.entropy, (bins as f64).log2(), epsilon = 1e-12);
    }

    #[test]
    fn entropy_is_bounded_and_distribution_sums_to_one() {
        let ps: Vec<f64> = (0..256).map(|i| ((i * 37) % 101) as f64 / 100.0).collect();
        let s = snapshot(0, &ps, 20);
        assert!(s.entropy >= 0.0);
        assert!(s.entropy <= (20.0_f64).log2() + 1e-12);
        assert_abs_diff_eq!(s.probabilities.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn upper_edge_lands_in_last_bin() {
        assert_eq!(histogram(&[1.0, 0.999], 20), {
            let mut h = vec![0; 20];
            h[19] = 2;
            h
        });
    }

    #[test]
    fn groups_follow_runs_of_equal_iteration() {
        let input = records(&[(0, &[0.1, 0.9][..]), (1, &[0.1, 0.2][..]), (0, &[0.95][..])]);
        let mut seen = vec![];
        let n = process(input, 2, |s| {
            seen.push((s.iteration, s.probabilities.clone()));
            Ok(())
        })
        .unwrap();
        assert_eq!(n, 3);
        assert_eq!(
            seen,
            vec![
                (0, vec![0.5, 0.5]),
                (1, vec![1.0, 0.0]),
                (0, vec![0.0, 1.0]),
            ]
        );
    }

    #[test]
    fn empty_stream_emits_nothing() {
        let n = process(Vec::<TraceRecord>::new(), 20, |_| panic!("nothing to emit")).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn histogram_blocks_have_no_index_field() {
        let mut out = SnapshotWriter::new(Vec::new(), Vec::new()).unwrap();
        out.write(&snapshot(7, &[0.1, 0.9], 2)).unwrap();
        let (entropy, histogram) = out.finish().unwrap();
        assert_eq!(String::from_utf8(entropy).unwrap(), "iteration,entropy\n7,1\n");
        let mut expected = 0.5_f64.to_le_bytes().to_vec();
        expected.extend_from_slice(&0.5_f64.to_le_bytes());
        assert_eq!(histogram, expected);
    }

    fn write_trace(path: &Path) {
        let mut w = TraceWriter::create(path).unwrap();
        for t in 0..5 {
            w.write_iteration(t, (0..16).map(|i| ((i * (t + 3)) % 17) as f64 / 16.0))
                .unwrap();
        }
        w.flush().unwrap();
    }

    fn settings_in(dir: &Path) -> AnalysisSettings {
        let name = |f: &str| dir.join(f).to_string_lossy().into_owned();
        AnalysisSettings {
            trace: name("p_values.bin"),
            entropy: name("entropy_results.csv"),
            histogram: name("histogram_data.bin"),
            ..AnalysisSettings::default()
        }
    }

    #[test]
    fn reanalysis_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let o = settings_in(dir.path());
        write_trace(Path::new(&o.trace));

        assert_eq!(analyze(&o).unwrap(), 5);
        let entropy_first = std::fs::read(&o.entropy).unwrap();
        let histogram_first = std::fs::read(&o.histogram).unwrap();
        assert_eq!(histogram_first.len(), 5 * 20 * 8);
        assert_eq!(String::from_utf8_lossy(&entropy_first).lines().count(), 6);

        assert_eq!(analyze(&o).unwrap(), 5);
        assert_eq!(std::fs::read(&o.entropy).unwrap(), entropy_first);
        assert_eq!(std::fs::read(&o.histogram).unwrap(), histogram_first);
    }

    #[test]
    fn empty_trace_creates_no_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let o = settings_in(dir.path());
        File::create(&o.trace).unwrap();

        assert_eq!(analyze(&o).unwrap(), 0);
        assert!(!Path::new(&o.entropy).exists());
        assert!(!Path::new(&o.histogram).exists());
    }

    #[test]
    fn missing_trace_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let o = settings_in(dir.path());
        match analyze(&o) {
            Err(Error::Unavailable { .. }) => {}
            other => panic!("expected an unavailable trace, got {:?}", other),
        }
    }
}
