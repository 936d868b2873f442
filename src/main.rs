use std::process::ExitCode;

fn main() -> ExitCode {
    match waveplate_cal::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        // `app::run` has already logged the failure.
        Err(err) => ExitCode::from(err.exit_code()),
    }
}
