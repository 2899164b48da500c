use std::env;
use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use channel_progress::utils::format::format_summary;
use channel_progress::utils::logging::init_tracing_with_level;
use channel_progress::{
    parse_channel_ref, ChannelDownloadSummary, ErrorKind, Operation, OperationRunner,
    ProgressConfig, ProgressObserver, ProgressState, RunState,
};

/// Terminal progress bar following a channel download
struct IndicatifObserver {
    pb: ProgressBar,
}

impl IndicatifObserver {
    fn new() -> Self {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { pb }
    }
}

impl ProgressObserver<ChannelDownloadSummary> for IndicatifObserver {
    fn on_progress(&mut self, state: &ProgressState) {
        self.pb.set_position(state.overall_percent.round() as u64);
        let prefix = state.step_label().unwrap_or_default();
        if prefix.is_empty() {
            self.pb.set_message(state.current_message.clone());
        } else {
            self.pb
                .set_message(format!("{} | {}", prefix, state.current_message));
        }
    }

    fn on_step_changed(&mut self, index: usize, name: &str) {
        self.pb.println(format!("▶ Step {}: {}", index + 1, name));
    }

    fn on_success(&mut self, summary: ChannelDownloadSummary) {
        self.pb.finish_with_message("done");
        println!("{}", format_summary(&summary));
    }

    fn on_failure(&mut self, kind: ErrorKind, detail: &str) {
        self.pb.abandon_with_message(format!("failed ({})", kind));
        eprintln!("Error: {detail}");
    }

    fn on_cancelled(&mut self) {
        self.pb.abandon_with_message("cancelled");
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: progress-demo <channel-url-or-id> [video-count]");
        std::process::exit(1);
    }

    let channel = match parse_channel_ref(&args[1]) {
        Ok(channel) => channel,
        Err(error) => {
            eprintln!("Error: {error}");
            std::process::exit(1);
        }
    };
    let video_count = args
        .get(2)
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(8)
        .max(1);

    let config = ProgressConfig::load().unwrap_or_else(|err| {
        eprintln!("Using default configuration: {err:#}");
        ProgressConfig::default()
    });
    init_tracing_with_level(Some(&config.log_level));

    let parser = match config.build_parser() {
        Ok(parser) => parser,
        Err(error) => {
            eprintln!("Error: {error:#}");
            std::process::exit(1);
        }
    };

    // The simulated download drives two steps
    let steps = if config.steps.len() >= 2 {
        config.steps.clone()
    } else {
        ProgressConfig::default().steps
    };

    let channel_name = channel.to_string();
    let operation = Operation::new("channel download", move |sink| {
        sink.indeterminate(format!("Resolving {}", channel_name));
        thread::sleep(Duration::from_millis(300));

        sink.step_started(0)?;
        for i in 1..=video_count {
            sink.checkpoint()?;
            thread::sleep(Duration::from_millis(120));
            sink.message(format!("Transcript download: {}/{}", i, video_count));
        }
        sink.step_completed(0)?;

        sink.step_started(1)?;
        for i in 1..=video_count {
            sink.checkpoint()?;
            thread::sleep(Duration::from_millis(80));
            sink.message(format!("Thumbnail download: {}/{}", i, video_count));
        }
        sink.finish("Channel download complete");

        Ok(ChannelDownloadSummary {
            channel_name,
            total_videos: video_count,
            transcripts_downloaded: video_count,
            thumbnails_downloaded: video_count,
            failed_downloads: 0,
            archive_path: None,
        })
    })
    .with_steps(steps)
    .with_parser(parser);

    let mut runner = match OperationRunner::new() {
        Ok(runner) => runner,
        Err(error) => {
            eprintln!("Error: {error}");
            std::process::exit(1);
        }
    };

    if let Err(error) = runner.start(operation, IndicatifObserver::new()) {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }

    let state = runner.wait_blocking(Duration::from_millis(config.poll_interval_ms));
    if state != RunState::Succeeded {
        std::process::exit(1);
    }
}
