use crate::error::SessionLogError;
use crate::session::PracticeSession;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Almacenamiento local del registro de sesiones
pub trait SessionStorage: Send {
    fn read(&self) -> Result<Vec<PracticeSession>, SessionLogError>;
    fn write(&mut self, sessions: &[PracticeSession]) -> Result<(), SessionLogError>;
    fn clear(&mut self) -> Result<(), SessionLogError>;
}

/// Registro en un fichero JSON (array de sesiones, de la más antigua a la
/// más reciente). Se escribe a un temporal y se renombra.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStorage for JsonFileStorage {
    fn read(&self) -> Result<Vec<PracticeSession>, SessionLogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&mut self, sessions: &[PracticeSession]) -> Result<(), SessionLogError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(sessions)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SessionLogError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Almacenamiento en memoria, para hosts sin disco y para pruebas.
/// `fail_writes` hace fallar las N próximas escrituras.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    pub sessions: Vec<PracticeSession>,
    pub fail_writes: usize,
}

impl SessionStorage for MemoryStorage {
    fn read(&self) -> Result<Vec<PracticeSession>, SessionLogError> {
        Ok(self.sessions.clone())
    }

    fn write(&mut self, sessions: &[PracticeSession]) -> Result<(), SessionLogError> {
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(SessionLogError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "almacenamiento lleno",
            )));
        }
        self.sessions = sessions.to_vec();
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SessionLogError> {
        self.sessions.clear();
        Ok(())
    }
}

/// Registro acotado de sesiones de práctica: una entrada por id, como máximo
/// `cap` sesiones (se descartan las más antiguas).
pub struct SessionLog<S: SessionStorage = JsonFileStorage> {
    storage: S,
    cap: usize,
    cache: Vec<PracticeSession>,
}

impl<S: SessionStorage> SessionLog<S> {
    /// Abre el registro. Si no se puede leer se empieza vacío.
    pub fn open(storage: S, cap: usize) -> Self {
        let cache = match storage.read() {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!("[LOG] No se pudo leer el registro de sesiones: {}", e);
                Vec::new()
            }
        };
        let mut log = Self {
            storage,
            cap: cap.max(1),
            cache,
        };
        log.prune_to_cap();
        debug!("[LOG] {} sesiones en el registro", log.cache.len());
        log
    }

    /// Guarda (o reemplaza) una sesión. Ante un fallo de escritura descarta
    /// la mitad más antigua de la caché y reintenta una vez; si vuelve a
    /// fallar la escritura se pierde. Devuelve si quedó persistida.
    pub fn save(&mut self, session: PracticeSession) -> bool {
        self.cache.retain(|s| s.id != session.id);
        self.cache.push(session);
        self.prune_to_cap();

        match self.storage.write(&self.cache) {
            Ok(()) => true,
            Err(e) => {
                warn!("[LOG] Error guardando sesiones: {} (se podan las más antiguas)", e);
                let drop_count = self.cache.len() / 2;
                self.cache.drain(..drop_count);

                match self.storage.write(&self.cache) {
                    Ok(()) => {
                        info!("[LOG] Guardado tras podar {} sesiones", drop_count);
                        true
                    }
                    Err(e) => {
                        warn!("[LOG] Se descarta la escritura: {}", e);
                        false
                    }
                }
            }
        }
    }

    pub fn sessions(&self) -> &[PracticeSession] {
        &self.cache
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Borra todos los datos de práctica
    pub fn clear(&mut self) -> Result<(), SessionLogError> {
        self.cache.clear();
        self.storage.clear()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn prune_to_cap(&mut self) {
        if self.cache.len() > self.cap {
            let excess = self.cache.len() - self.cap;
            self.cache.drain(..excess);
        }
    }
}
