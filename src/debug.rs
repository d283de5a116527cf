impl std::fmt::Debug for crate::PayoffWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: String = self
            .payoffs
            .iter()
            .map(|&p| if p > 0 { '1' } else { '0' })
            .collect();
        write!(f, "[{}]", rendered)
    }
}

impl std::fmt::Debug for crate::Agent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("index", &self.index)
            .field("row", &self.row)
            .field("col", &self.col)
            .field("p", &self.propensity)
            .field("payoffs", &self.payoffs)
            .finish()
    }
}

impl std::fmt::Debug for crate::State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("t", &self.t)
            .field("agents", &self.propensities.len())
            .field(
                "p_mean",
                &crate::util::mean_and_variance(&self.propensities).0,
            )
            .field(
                "p_median",
                &crate::observation::upper_median(&self.propensities),
            )
            .finish()
    }
}
