use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use dactilo::feature_extractor::FeatureExtractor;
use dactilo::landmark_csv::load_frames_from_csv;
use dactilo::pipeline::{PipelineEvent, RecognitionPipeline};
use dactilo::session_log::{MemoryStorage, SessionLog};
use dactilo::types::FeatureVector;
use dactilo::{InferenceEngine, RecognitionConfig};

const USAGE: &str =
    "Uso: replay_csv [--model pesos.json] [--fps 30] [--simulate] [--dump-features] <grabacion.csv>";

struct ReplayOptions {
    model: PathBuf,
    fps: f32,
    simulate: bool,
    dump_features: bool,
}

fn parse_args() -> Result<(PathBuf, ReplayOptions)> {
    let mut model = PathBuf::from("pesos_mlp.json");
    let mut fps = 30.0;
    let mut simulate = false;
    let mut dump_features = false;
    let mut csv_path: Option<PathBuf> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--model" => {
                model = PathBuf::from(args.next().ok_or_else(|| anyhow!("{}", USAGE))?);
            }
            "--fps" => {
                let value = args.next().ok_or_else(|| anyhow!("{}", USAGE))?;
                fps = value
                    .parse()
                    .map_err(|_| anyhow!("fps inválido: {}", value))?;
                if !(fps > 0.0) {
                    bail!("fps debe ser positivo");
                }
            }
            "--simulate" => simulate = true,
            "--dump-features" => dump_features = true,
            _ => {
                if csv_path.is_some() {
                    bail!("{}", USAGE);
                }
                csv_path = Some(PathBuf::from(arg));
            }
        }
    }

    let csv_path = csv_path.ok_or_else(|| anyhow!("Debes especificar un archivo CSV"))?;
    Ok((
        csv_path,
        ReplayOptions {
            model,
            fps,
            simulate,
            dump_features,
        },
    ))
}

fn main() -> Result<()> {
    let (csv_path, opts) = parse_args()?;
    println!("🎞️  Reproduciendo grabación desde {:?}", csv_path);

    let frames = load_frames_from_csv(&csv_path)?;
    println!("ℹ️  {} frames cargados", frames.len());

    let engine = Arc::new(InferenceEngine::new());
    engine.load_file(&opts.model)?;

    let extractor = FeatureExtractor::new();
    let features = frames
        .iter()
        .map(|f| extractor.extract(&f.landmarks, f.handedness))
        .collect::<Result<Vec<FeatureVector>, _>>()?;

    let results = engine.predict_batch(&features);

    for (idx, result) in results.iter().enumerate() {
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                println!("  {:04}: ❌ {}", idx, e);
                continue;
            }
        };
        println!(
            "\n🥇 Frame {:04}: {} ({:.1}%)",
            idx,
            result.label,
            result.confidence * 100.0
        );
        for (rank, (label, score)) in result.top_k(5).iter().enumerate() {
            println!("  {:>2}. {:<8} {:>6.2}%", rank + 1, label.as_str(), score * 100.0);
        }
    }

    if opts.dump_features {
        if let Some(first) = features.first() {
            println!("\n📊 63 features del primer frame (x, y, z intercalados):");
            for (idx, value) in first.iter().enumerate() {
                println!("  {:02}: {:>12.6}", idx, value);
            }
        }
    }

    if opts.simulate {
        simulate(&engine, &frames, opts.fps);
    }

    Ok(())
}

/// Pasa la grabación por el filtro y la máquina de confirmación con un
/// reloj simulado a `fps` frames por segundo
fn simulate(engine: &Arc<InferenceEngine>, frames: &[dactilo::types::HandFrame], fps: f32) {
    let config = RecognitionConfig::default();
    let tick_interval = config.tick_interval();
    let log = SessionLog::open(MemoryStorage::default(), config.session_log_cap);
    let t0 = Instant::now();
    let mut pipeline = RecognitionPipeline::new(Arc::clone(engine), config, log);

    let frame_interval = Duration::from_secs_f32(1.0 / fps);
    let mut next_tick = t0;
    let mut committed = Vec::new();

    println!("\n⏱️  Simulación a {:.0} fps", fps);
    for (idx, frame) in frames.iter().enumerate() {
        let now = t0 + frame_interval * idx as u32;
        let mut events = pipeline.on_frame(Some(frame), now);
        while next_tick <= now {
            events.extend(pipeline.tick(next_tick));
            next_tick += tick_interval;
        }
        for event in events {
            if let PipelineEvent::Committed { symbol, .. } = event {
                println!("  🔒 {:>6.2}s  {:?}", (now - t0).as_secs_f32(), symbol);
                committed.push(symbol);
            }
        }
    }

    println!("✅ {} símbolos confirmados", committed.len());
    if let Some(transcript) = pipeline.transcript() {
        println!("📜 {}", transcript);
    }
}
