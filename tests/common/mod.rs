use std::{
    io::Write,
    path::PathBuf,
    sync::atomic::{AtomicU32, Ordering},
    sync::Once,
};

use rand::Rng;

static INIT: Once = Once::new();
static PATH_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn setup() {
    INIT.call_once(init_log);
}

fn init_log() {
    use env_logger::Builder;

    let mut builder = Builder::from_default_env();
    builder
        .format_timestamp_secs()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} - {}] [{}:{}] {}",
                record.level(),
                record.target(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .is_test(true)
        .init();
}

/// A fresh database file path in the system temp directory. Each call
/// gets its own file, so parallel tests never collide.
pub fn temp_db_path(name: &str) -> PathBuf {
    let counter = PATH_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!(
        "tiny_db_{}_{}_{}.db",
        name,
        std::process::id(),
        counter
    ));
    let _ = std::fs::remove_file(&path);
    path
}

pub fn random_string<R: Rng>(rng: &mut R, len: usize) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0, CHARSET.len())] as char)
        .collect()
}
