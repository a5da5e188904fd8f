/*
Reconocimiento de dactilología en tiempo real

Demonio que:
1. Lee frames de landmarks de mano (JSON, uno por línea) desde stdin
2. Extrae características y ejecuta el MLP en un hilo de inferencia
3. Filtra las predicciones y confirma símbolos manteniendo el signo
4. Registra sesiones de práctica y calcula estadísticas por letra

Formato de entrada (una línea por frame):
  {"landmarks":[{"x":0.5,"y":0.4,"z":0.0}, ...21], "handedness":"Left"}
  null                       (sin mano)
  {"command":"space"}        (space | delete | next | reset | pause | resume)

Ejemplo:
  ./detector | ./target/release/dactilo run --model pesos_mlp.json --practice "HELLO"
*/

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, select, tick, unbounded, Receiver, Sender};
use serde::Deserialize;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn, Level};

use dactilo::analytics::AnalyticsAggregator;
use dactilo::landmark_csv::save_frames_to_csv;
use dactilo::pipeline::{
    spawn_inference_worker, InferenceOutput, PipelineEvent, PracticeMode, RecognitionPipeline,
};
use dactilo::session_log::{JsonFileStorage, SessionLog, SessionStorage};
use dactilo::types::{Command, HandFrame};
use dactilo::{InferenceEngine, RecognitionConfig};

#[derive(Parser)]
#[command(name = "dactilo")]
#[command(about = "Reconocimiento de dactilología a partir de landmarks de mano")]
struct Cli {
    /// Fichero de configuración JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Registro de sesiones (sustituye a session_log_path)
    #[arg(long)]
    sessions: Option<PathBuf>,

    /// Logs de depuración
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Reconocimiento en vivo desde stdin
    Run {
        /// Pesos del MLP (JSON dense / dense_1 / dense_2)
        #[arg(short, long, default_value = "pesos_mlp.json")]
        model: PathBuf,

        /// Frase de práctica; sin ella se transcribe en modo libre
        #[arg(short, long)]
        practice: Option<String>,

        /// Umbral de confianza (0.0 - 1.0)
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Segundos que hay que mantener un signo
        #[arg(long)]
        hold: Option<f32>,

        /// Guarda los frames recibidos en un CSV
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Estadísticas y sugerencias a partir del registro
    Analytics,
    /// Borra todos los datos de práctica
    Clear,
}

/// Órdenes de la interfaz que llegan intercaladas con los frames
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Control {
    Space,
    Delete,
    Next,
    Reset,
    Pause,
    Resume,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InputLine {
    Control { command: Control },
    Frame(HandFrame),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => RecognitionConfig::from_file(path)?,
        None => RecognitionConfig::default(),
    };
    if let Some(path) = &cli.sessions {
        config.session_log_path = path.clone();
    }

    let log = SessionLog::open(
        JsonFileStorage::new(&config.session_log_path),
        config.session_log_cap,
    );

    match cli.mode {
        Mode::Run {
            model,
            practice,
            threshold,
            hold,
            record,
        } => {
            if let Some(threshold) = threshold {
                config.confidence_threshold = threshold;
            }
            if let Some(hold) = hold {
                config.hold_time_seconds = hold;
            }
            config.validate()?;
            run(config, log, model, practice, record)
        }
        Mode::Analytics => {
            print_analytics(&log, &config);
            Ok(())
        }
        Mode::Clear => {
            let mut log = log;
            log.clear().context("No se pudo borrar el registro de sesiones")?;
            println!("🗑️  Datos de práctica borrados");
            Ok(())
        }
    }
}

fn run<S: SessionStorage>(
    config: RecognitionConfig,
    log: SessionLog<S>,
    model: PathBuf,
    practice: Option<String>,
    record: Option<PathBuf>,
) -> Result<()> {
    println!("🤟 Dactilo - reconocimiento de deletreo manual\n");

    // Motor compartido (sólo lectura tras la carga)
    let engine = Arc::new(InferenceEngine::new());
    println!("🔧 Cargando pesos desde {:?}...", model);
    let load_result = engine.load_file(&model);

    let tick_interval = config.tick_interval();
    let mut pipeline = RecognitionPipeline::new(Arc::clone(&engine), config, log);

    match load_result {
        Ok(()) => println!("✅ Modelo cargado\n"),
        Err(e) => {
            println!("⚠️  Reconocimiento no disponible: {}", e);
            println!("   (los comandos y las estadísticas siguen funcionando)\n");
            pipeline.mark_unavailable(&e.to_string());
        }
    }

    match &practice {
        Some(sentence) => {
            pipeline.start_practice(sentence, Instant::now());
            if let PracticeMode::Practice(recorder) = pipeline.mode() {
                println!("📝 Frase objetivo: {}\n", recorder.target_sequence());
            }
        }
        None => println!("📝 Modo libre\n"),
    }

    // stdin → (frames, órdenes); frames → hilo de inferencia → resultados
    let (tx_frames, rx_frames) = bounded::<(Instant, Option<HandFrame>)>(100);
    let (tx_control, rx_control) = unbounded::<Control>();
    // El canal de órdenes sigue abierto hasta el final; el fin de la
    // entrada se detecta por el canal de resultados
    let _control_keepalive = tx_control.clone();
    let (tx_results, rx_results) = bounded::<InferenceOutput>(100);

    std::thread::spawn(move || {
        if let Err(e) = read_stdin(tx_frames, tx_control, record) {
            eprintln!("❌ Error leyendo stdin: {}", e);
        }
    });
    let worker = spawn_inference_worker(Arc::clone(&engine), rx_frames, tx_results);

    let ticker = tick(tick_interval);

    println!("🎬 Iniciando reconocimiento...\n");

    loop {
        select! {
            recv(rx_results) -> msg => {
                match msg {
                    Ok(output) => {
                        let events = pipeline.on_inference(output);
                        print_events(&events, &pipeline);
                    }
                    // Fin de la entrada; `select!` no garantiza haber atendido
                    // antes las órdenes que quedaron en cola
                    Err(_) => {
                        let pending = drain_controls(&rx_control, &mut pipeline);
                        debug!("[PIPELINE] {} órdenes pendientes aplicadas al cerrar", pending);
                        break;
                    }
                }
            }
            recv(rx_control) -> msg => {
                if let Ok(control) = msg {
                    handle_control(control, &mut pipeline);
                }
            }
            recv(ticker) -> msg => {
                if let Ok(now) = msg {
                    let events = pipeline.tick(now);
                    print_events(&events, &pipeline);
                }
            }
        }
    }

    if worker.join().is_err() {
        warn!("[PIPELINE] El hilo de inferencia terminó con pánico");
    }

    // Guarda la sesión parcial antes de salir
    pipeline.set_enabled(false, Instant::now());

    if let Some(transcript) = pipeline.transcript() {
        println!("\n📜 Transcripción: {}", transcript);
    }
    println!("👋 Fin de la entrada");
    Ok(())
}

fn read_stdin(
    tx_frames: Sender<(Instant, Option<HandFrame>)>,
    tx_control: Sender<Control>,
    record: Option<PathBuf>,
) -> Result<()> {
    let stdin = io::stdin();
    let mut recorded: Vec<HandFrame> = Vec::new();

    for (line_idx, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let now = Instant::now();
        if line == "null" {
            if tx_frames.send((now, None)).is_err() {
                break;
            }
            continue;
        }

        match serde_json::from_str::<InputLine>(line) {
            Ok(InputLine::Frame(frame)) => {
                if record.is_some() {
                    recorded.push(frame.clone());
                }
                if tx_frames.send((now, Some(frame))).is_err() {
                    break;
                }
            }
            Ok(InputLine::Control { command }) => {
                if tx_control.send(command).is_err() {
                    break;
                }
            }
            Err(e) => debug!("Línea {} ignorada: {}", line_idx + 1, e),
        }
    }

    if let Some(path) = record {
        if !recorded.is_empty() {
            save_frames_to_csv(&path, &recorded)?;
            println!("💾 {} frames guardados en {:?}", recorded.len(), path);
        }
    }
    Ok(())
}

/// Aplica las órdenes ya encoladas sin bloquear
fn drain_controls<S: SessionStorage>(
    rx_control: &Receiver<Control>,
    pipeline: &mut RecognitionPipeline<S>,
) -> usize {
    let mut handled = 0;
    for control in rx_control.try_iter() {
        handle_control(control, pipeline);
        handled += 1;
    }
    handled
}

fn handle_control<S: SessionStorage>(control: Control, pipeline: &mut RecognitionPipeline<S>) {
    let now = Instant::now();
    match control {
        Control::Space => {
            let events = pipeline.command(Command::Space, now);
            print_events(&events, pipeline);
        }
        Control::Delete => {
            let events = pipeline.command(Command::Delete, now);
            print_events(&events, pipeline);
        }
        Control::Next => {
            let sentence = pipeline.next_sentence(now);
            println!("📝 Nueva frase: {}", sentence);
        }
        Control::Reset => {
            pipeline.reset_sentence();
            println!("🔄 Frase reiniciada");
        }
        Control::Pause => {
            pipeline.set_enabled(false, now);
            println!("⏸️  Reconocimiento en pausa");
        }
        Control::Resume => {
            pipeline.set_enabled(true, now);
            println!("▶️  Reconocimiento reanudado");
        }
    }
}

fn print_events<S: SessionStorage>(events: &[PipelineEvent], pipeline: &RecognitionPipeline<S>) {
    for event in events {
        match event {
            PipelineEvent::Feedback { detected, feedback } => {
                let mark = if feedback.is_correct { "✅" } else { "❌" };
                println!("👋 {} {} {}", detected, mark, feedback.message);
            }
            PipelineEvent::Committed { symbol, entry } => {
                match entry {
                    Some(entry) => println!(
                        "🔒 Confirmado: {:?} (esperado '{}', {})",
                        symbol,
                        entry.expected_symbol,
                        if entry.is_correct { "correcto" } else { "incorrecto" }
                    ),
                    None => println!("🔒 Confirmado: {:?}", symbol),
                }
                if let Some(transcript) = pipeline.transcript() {
                    println!("   📜 {}", transcript);
                }
            }
            PipelineEvent::SessionCompleted(session) => {
                println!(
                    "🏁 Frase \"{}\" completada: {:.1}% en {} s",
                    session.target_sequence,
                    session.accuracy * 100.0,
                    session.duration_seconds
                );
            }
            PipelineEvent::RecognitionUnavailable(reason) => {
                println!("⚠️  Reconocimiento no disponible: {}", reason);
            }
        }
    }
}

fn print_analytics<S: SessionStorage>(log: &SessionLog<S>, config: &RecognitionConfig) {
    let analytics = AnalyticsAggregator::from_config(log.sessions(), Utc::now(), config);
    let overall = analytics.overall_stats();

    println!("📊 Estadísticas de práctica\n");
    println!("  Sesiones:            {}", overall.total_sessions);
    println!("  Tiempo total:        {} s", overall.total_practice_seconds);
    println!("  Precisión media:     {:.1}%", overall.average_accuracy * 100.0);
    println!(
        "  Precisión reciente:  {:.1}% (últimos {} días)",
        overall.recent_accuracy * 100.0,
        config.recency_window_days
    );
    println!("  Letras dominadas:    {}", overall.symbols_mastered);
    println!("  Letras practicadas:  {}", overall.total_symbols_practiced);

    let stats = analytics.symbol_stats();
    if !stats.is_empty() {
        println!("\nPor letra:");
        for stat in stats.values() {
            println!(
                "  {}  {:>3}/{:<3} {:>6.1}%  {}",
                stat.symbol,
                stat.correct_attempts,
                stat.total_attempts,
                stat.accuracy * 100.0,
                stat.last_practiced_at.format("%Y-%m-%d")
            );
        }
    }

    let trend = analytics.accuracy_trend(config.recency_window_days);
    if !trend.is_empty() {
        println!("\n📈 Tendencia:");
        for (day, accuracy) in trend {
            println!("  {}  {:>6.1}%", day, accuracy * 100.0);
        }
    }

    let weak = analytics.weak_symbols(config.min_attempts_for_weakness);
    let stale = analytics.stale_symbols(config.recency_window_days);
    println!("\n🔻 Letras débiles:   {}", join_symbols(&weak));
    println!("💤 Sin practicar:    {}", join_symbols(&stale));

    println!("\n💡 Sugerencias:");
    for suggestion in analytics.suggestions() {
        println!(
            "  [{:?}] {} → {}",
            suggestion.priority,
            join_symbols(&suggestion.symbols),
            suggestion.reason
        );
        for sentence in &suggestion.suggested_sentences {
            println!("      · {}", sentence);
        }
    }
}

fn join_symbols(symbols: &[char]) -> String {
    if symbols.is_empty() {
        return "-".to_string();
    }
    symbols.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dactilo::session_log::MemoryStorage;

    #[test]
    fn test_control_lines_parse() {
        let line: InputLine = serde_json::from_str(r#"{"command":"delete"}"#).unwrap();
        assert!(matches!(line, InputLine::Control { command: Control::Delete }));
    }

    #[test]
    fn test_pending_controls_applied_at_end_of_input() {
        let log = SessionLog::open(MemoryStorage::default(), 10);
        let engine = Arc::new(InferenceEngine::new());
        let mut pipeline = RecognitionPipeline::new(engine, RecognitionConfig::default(), log);

        let (tx_control, rx_control) = unbounded();
        for control in [Control::Space, Control::Space, Control::Delete] {
            tx_control.send(control).unwrap();
        }
        // Los resultados ya se cerraron: sólo quedan órdenes en cola
        let (tx_results, rx_results) = bounded::<InferenceOutput>(1);
        drop(tx_results);
        assert!(rx_results.recv().is_err());

        assert_eq!(drain_controls(&rx_control, &mut pipeline), 3);
        assert_eq!(pipeline.transcript(), Some(" "));
        assert!(rx_control.is_empty());
    }
}
