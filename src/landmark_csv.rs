use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, bail, ensure, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};

use crate::types::{HandFrame, Handedness, Landmark, NUM_LANDMARKS};

const HEADER: [&str; 6] = ["frame", "handedness", "landmark", "x", "y", "z"];

/// Carga una grabación de landmarks en el formato
/// frame,handedness,landmark,x,y,z (una fila por landmark).
///
/// Los frames se devuelven ordenados por número; cada uno debe tener sus
/// 21 landmarks y una sola mano.
pub fn load_frames_from_csv(path: impl AsRef<Path>) -> Result<Vec<HandFrame>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV {:?}", path))?;

    let mut frames: BTreeMap<usize, (Handedness, [Option<Landmark>; NUM_LANDMARKS])> =
        BTreeMap::new();

    for (row_idx, result) in reader.records().enumerate() {
        let row = row_idx + 1;
        let record = result.with_context(|| format!("Fila {} inválida en {:?}", row, path))?;
        if record.len() < 6 {
            bail!("La fila {} no tiene 6 columnas", row);
        }

        let frame: usize = record[0]
            .parse()
            .with_context(|| format!("frame inválido en fila {}", row))?;
        let handedness = Handedness::parse(&record[1])
            .ok_or_else(|| anyhow!("handedness inválido en fila {}: {:?}", row, &record[1]))?;
        let landmark: usize = record[2]
            .parse()
            .with_context(|| format!("landmark inválido en fila {}", row))?;
        if landmark >= NUM_LANDMARKS {
            bail!("Landmark {} fuera de rango (fila {})", landmark, row);
        }

        let x: f32 = record[3].parse().with_context(|| format!("x inválido en fila {}", row))?;
        let y: f32 = record[4].parse().with_context(|| format!("y inválido en fila {}", row))?;
        let z: f32 = record[5].parse().with_context(|| format!("z inválido en fila {}", row))?;
        ensure!(
            x.is_finite() && y.is_finite() && z.is_finite(),
            "Coordenada no finita en fila {}",
            row
        );

        let entry = frames
            .entry(frame)
            .or_insert((handedness, [None; NUM_LANDMARKS]));
        ensure!(
            entry.0 == handedness,
            "El frame {} mezcla manos distintas (fila {})",
            frame,
            row
        );
        entry.1[landmark] = Some(Landmark::new(x, y, z));
    }

    if frames.is_empty() {
        return Err(anyhow!("El CSV {:?} no contiene datos", path));
    }

    frames
        .into_iter()
        .map(|(frame, (handedness, points))| {
            let landmarks = points
                .iter()
                .enumerate()
                .map(|(idx, p)| {
                    p.ok_or_else(|| anyhow!("Al frame {} le falta el landmark {}", frame, idx))
                })
                .collect::<Result<Vec<Landmark>>>()?;
            Ok(HandFrame {
                landmarks,
                handedness,
            })
        })
        .collect()
}

/// Escribe frames en el mismo formato que `load_frames_from_csv`
pub fn save_frames_to_csv(path: impl AsRef<Path>, frames: &[HandFrame]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("No se pudo crear el CSV {:?}", path))?;

    writer.write_record(HEADER)?;
    for (frame_idx, frame) in frames.iter().enumerate() {
        for (idx, lm) in frame.landmarks.iter().enumerate() {
            writer.write_record([
                frame_idx.to_string(),
                frame.handedness.as_str().to_string(),
                idx.to_string(),
                lm.x.to_string(),
                lm.y.to_string(),
                lm.z.to_string(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}
