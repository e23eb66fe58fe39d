use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(
    storm_home: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    let base = storm_home.or(home_dir)?;
    Some(base.join("stormtrack/.env"))
}

/// Load `.env` from the working directory, else from the stormtrack checkout
/// under `STORM_HOME` (or `~`). Variables already set win.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("STORM_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}
