use allsky_capture::analysis::LumaMeanEstimator;
use allsky_capture::camera::LibcameraStill;
use allsky_capture::cli::{
    apply_overrides, handle_config_action, print_summary, show_sun, Args, Command,
};
use allsky_capture::clock::SystemClock;
use allsky_capture::config::Config;
use allsky_capture::effects::ScriptDispatcher;
use allsky_capture::scheduler::{Collaborators, Scheduler};
use allsky_capture::signals::{install_handlers, StopFlag, EXIT_ERROR_STOP};
use allsky_capture::solar::NoaaSolarCalculator;
use clap::Parser;

fn main() {
    // Load .env file before anything else; a missing file is fine
    let _ = dotenv::dotenv();

    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_filter()))
        .init();

    match args.command {
        Some(Command::Config { ref action }) => {
            handle_config_action(action.clone(), args.config.as_deref());
        }
        Some(Command::Sun) => {
            let result = Config::load(args.config.as_deref()).and_then(|c| show_sun(&c));
            if let Err(e) = result {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        None => std::process::exit(run(&args)),
    }
}

/// Run the capture loop and return the process exit code.
fn run(args: &Args) -> i32 {
    let mut config = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{}", e);
            return EXIT_ERROR_STOP;
        }
    };
    apply_overrides(&mut config, args);

    let settings = match config.scheduler_settings() {
        Ok(s) => s,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            return EXIT_ERROR_STOP;
        }
    };
    let location = match config.location() {
        Ok(l) => l,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            return EXIT_ERROR_STOP;
        }
    };

    let stop = StopFlag::new();
    if let Err(e) = install_handlers(&stop) {
        log::error!("{}", e);
        return EXIT_ERROR_STOP;
    }

    log::info!("******************************************");
    log::info!("*** Allsky Camera Software {} ***", env!("CARGO_PKG_VERSION"));
    log::info!("******************************************");
    print_summary(&config, &settings);

    let mut camera =
        LibcameraStill::new(config.camera.command.clone()).with_extra_timeout(config.extra_timeout());
    let mut solar = NoaaSolarCalculator::new(location);
    let mut estimator = LumaMeanEstimator;
    let effects = ScriptDispatcher::new(
        config.output.scripts_dir.clone(),
        config.output.notification_images,
    );
    let mut clock = SystemClock;

    let mut scheduler = Scheduler::new(
        settings,
        Collaborators {
            camera: &mut camera,
            solar: &mut solar,
            estimator: &mut estimator,
            effects: &effects,
            clock: &mut clock,
        },
        stop,
    );
    scheduler.run().exit_code()
}
