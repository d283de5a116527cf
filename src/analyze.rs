use model::analysis::{analyze, AnalysisSettings};
use model::argparse::parse_analysis_args;
use model::observation::init_logging;
use tracing::info;

fn main() -> Result<(), String> {
    init_logging();

    let mut o = AnalysisSettings::default();
    {
        let parser = parse_analysis_args(&mut o);
        parser.parse_args_or_exit();
    }

    let processed = analyze(&o).map_err(|e| e.to_string())?;
    info!("Processing complete: {} iterations.", processed);
    Ok(())
}
