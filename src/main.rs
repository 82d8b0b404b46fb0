//! Command-line front end: summarize one or more videos.

use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use vidsum::api::VideoSummarizer;
use vidsum::core::{Config, PipelineError, PipelineResult};

#[derive(Parser, Debug)]
#[command(name = "vidsum")]
#[command(about = "Keyframe extraction, transcription and summaries for videos")]
#[command(version)]
struct Args {
    /// Input video files
    #[arg(required = true)]
    videos: Vec<PathBuf>,

    /// Free-text context passed to the summarizer
    #[arg(short, long, default_value = "")]
    description: String,

    /// Upload keyframes, summary and audio to cloud storage
    #[arg(long, default_value_t = false)]
    cloud: bool,

    /// Keep a frame when its SSIM against the last keyframe is below this
    #[arg(long)]
    threshold: Option<f64>,

    /// Seconds between sampled frames
    #[arg(long)]
    interval: Option<f64>,

    /// Print results as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

/// 每个输入视频一条，顺序与命令行一致
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Outcome {
    Done(PipelineResult),
    Failed { video: PathBuf, error: String },
}

fn collect_outcomes(
    videos: &[PathBuf],
    results: Vec<Result<PipelineResult, PipelineError>>,
) -> Vec<Outcome> {
    videos
        .iter()
        .zip(results)
        .map(|(video, result)| match result {
            Ok(result) => Outcome::Done(result),
            Err(e) => Outcome::Failed {
                video: video.clone(),
                error: e.to_string(),
            },
        })
        .collect()
}

fn print_result(result: &PipelineResult) {
    println!("== {} ==", result.video_name);
    println!("Keyframes: {}", result.keyframes.len());
    for path in &result.keyframes {
        println!("  {}", path.display());
    }
    if let Some(path) = &result.summary_path {
        println!("Summary saved to {}", path.display());
    }
    if let Some(path) = &result.audio_path {
        println!("Audio: {}", path.display());
    }
    for uri in &result.uploaded {
        println!("Uploaded {}", uri);
    }
    println!();
    println!("{}", result.summary);
}

fn main() -> ExitCode {
    let args = Args::parse();
    vidsum::init_logging();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(threshold) = args.threshold {
        config.keyframe_threshold = threshold;
    }
    if let Some(interval) = args.interval {
        config.frame_extraction_rate = interval;
    }
    if let Err(e) = config.validate() {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    let summarizer = match VideoSummarizer::create(config, args.cloud) {
        Ok(summarizer) => summarizer,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let results = if args.videos.len() == 1 {
        vec![summarizer.summarize_video(&args.videos[0], &args.description)]
    } else {
        match summarizer.summarize_batch(&args.videos, &args.description) {
            Ok(results) => results,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    };

    let outcomes = collect_outcomes(&args.videos, results);
    for outcome in &outcomes {
        if let Outcome::Failed { video, error } = outcome {
            // 日志可能被 RUST_LOG 关掉，失败必须出现在 stderr
            eprintln!("error: {}: {}", video.display(), error);
        }
    }
    let failed = outcomes.iter().any(|o| matches!(o, Outcome::Failed { .. }));

    if args.json {
        match serde_json::to_string_pretty(&outcomes) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("error: failed to serialize results: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        outcomes.iter().for_each(|outcome| {
            if let Outcome::Done(result) = outcome {
                print_result(result)
            }
        });
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
