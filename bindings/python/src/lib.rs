// PyO3 bindings for recnorm_core
use once_cell::sync::Lazy;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyModule};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use recnorm_core as core;

use core::{NormalizerConfig, Outcome};

// Parallel iterators for batch normalization
use rayon::prelude::*;

// Resolved once, then shared read-only by every call; only explicit loads replace it.
static CONFIG: Lazy<RwLock<Option<Arc<NormalizerConfig>>>> = Lazy::new(|| RwLock::new(None));

fn to_py_err(e: core::Error) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn current_config() -> PyResult<Arc<NormalizerConfig>> {
    let guard = CONFIG
        .read()
        .map_err(|_| PyValueError::new_err("Config lock poisoned"))?;
    guard.clone().ok_or_else(|| {
        PyValueError::new_err("No config loaded. Call load_config() or set_config_json().")
    })
}

fn install_config(cfg: NormalizerConfig) -> PyResult<()> {
    let mut guard = CONFIG
        .write()
        .map_err(|_| PyValueError::new_err("Config lock poisoned"))?;
    *guard = Some(Arc::new(cfg));
    Ok(())
}

fn outcome_dict<'py>(
    py: Python<'py>,
    record: &str,
    outcome: &Outcome,
    runtime_ns: u128,
) -> PyResult<Bound<'py, PyDict>> {
    let d = PyDict::new(py);
    d.set_item("record", record)?;
    d.set_item("changed", outcome.changed)?;
    d.set_item("had_undefined", outcome.had_undefined)?;
    d.set_item("undefined_fields", outcome.undefined_fields)?;
    d.set_item("encoded", outcome.encoded)?;
    d.set_item("runtime_ns", runtime_ns)?;
    Ok(d)
}

/// Load normalizer options from a JSON file path. Returns True on success.
/// Raises ValueError if the file cannot be read, parsed, or validated.
#[pyfunction]
#[pyo3(text_signature = "(config_path)")]
fn load_config(config_path: &str) -> PyResult<bool> {
    let cfg = NormalizerConfig::from_path(config_path).map_err(to_py_err)?;
    install_config(cfg)?;
    Ok(true)
}

/// Set normalizer options from a JSON string. Returns True on success.
#[pyfunction]
#[pyo3(text_signature = "(config_json)")]
fn set_config_json(config_json: &str) -> PyResult<bool> {
    let cfg = NormalizerConfig::from_json(config_json).map_err(to_py_err)?;
    install_config(cfg)?;
    Ok(true)
}

/// Return whether options are loaded, plus the settings that shape output.
#[pyfunction]
#[pyo3(text_signature = "()")]
fn get_config_status(py: Python) -> PyResult<Py<PyDict>> {
    let guard = CONFIG
        .read()
        .map_err(|_| PyValueError::new_err("Config lock poisoned"))?;
    let d = PyDict::new(py);
    match guard.as_ref() {
        Some(cfg) => {
            d.set_item("loaded", true)?;
            d.set_item("use_undefined", cfg.use_undefined)?;
            d.set_item("merge_json_log", cfg.merge_json_log)?;
            d.set_item("undefined_to_string", cfg.undefined_to_string)?;
            d.set_item("undefined_name", cfg.undefined_name.as_str())?;
            d.set_item("keep_fields", cfg.keep_fields.len())?;
            d.set_item("keep_empty_fields", cfg.keep_empty_fields.len())?;
            d.set_item("dot_replace", cfg.dot_replace())?;
            d.set_item("max_num_fields", cfg.max_num_fields)?;
        }
        None => {
            d.set_item("loaded", false)?;
        }
    }
    Ok(d.unbind())
}

/// Normalize one JSON record. Returns (record_json, changed, had_undefined).
#[pyfunction]
#[pyo3(text_signature = "(line)")]
fn normalize_json(line: &str) -> PyResult<(String, bool, bool)> {
    let cfg = current_config()?;
    let (out, outcome) = core::process_json(line, &cfg).map_err(to_py_err)?;
    Ok((out, outcome.changed, outcome.had_undefined))
}

/// Normalize one JSON record and return the record with every outcome signal and runtime.
#[pyfunction]
#[pyo3(text_signature = "(line)")]
fn normalize_enriched(py: Python, line: &str) -> PyResult<Py<PyDict>> {
    let cfg = current_config()?;
    let t0 = Instant::now();
    let (out, outcome) = core::process_json(line, &cfg).map_err(to_py_err)?;
    let runtime_ns = t0.elapsed().as_nanos();
    Ok(outcome_dict(py, &out, &outcome, runtime_ns)?.unbind())
}

/// Normalize a batch of records in parallel and return enriched dicts per record.
/// Records are processed with Rayon against one shared config snapshot; Python
/// dicts are built afterwards. The first failing record fails the batch.
#[pyfunction]
#[pyo3(text_signature = "(lines)")]
fn normalize_batch(py: Python, lines: Vec<String>) -> PyResult<Vec<Py<PyDict>>> {
    let cfg = current_config()?;

    let mids: Vec<core::Result<(String, Outcome, u128)>> = lines
        .par_iter()
        .map(|line| -> core::Result<(String, Outcome, u128)> {
            let t0 = Instant::now();
            let (out, outcome) = core::process_json(line, &cfg)?;
            Ok((out, outcome, t0.elapsed().as_nanos()))
        })
        .collect();

    let mut out: Vec<Py<PyDict>> = Vec::with_capacity(mids.len());
    for r in mids {
        let (record, outcome, runtime_ns) = r.map_err(to_py_err)?;
        out.push(outcome_dict(py, &record, &outcome, runtime_ns)?.unbind());
    }
    Ok(out)
}

/// Normalize every record of an NDJSON file into another NDJSON file. Returns
/// the number of records written; blank lines are skipped.
#[pyfunction]
#[pyo3(text_signature = "(input_path, output_path)")]
fn normalize_file_to_ndjson(input_path: &str, output_path: &str) -> PyResult<usize> {
    use std::io::{BufRead, BufReader, BufWriter, Write};
    let cfg = current_config()?;

    let infile =
        std::fs::File::open(input_path).map_err(|e| PyValueError::new_err(e.to_string()))?;
    let outfile =
        std::fs::File::create(output_path).map_err(|e| PyValueError::new_err(e.to_string()))?;
    let reader = BufReader::new(infile);
    let mut writer = BufWriter::new(outfile);

    let mut count: usize = 0;
    let mut encoded: usize = 0;
    for line_res in reader.lines() {
        let line = line_res.map_err(|e| PyValueError::new_err(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let (out, outcome) = core::process_json(&line, &cfg).map_err(to_py_err)?;
        writer
            .write_all(out.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        count += 1;
        if outcome.encoded {
            encoded += 1;
        }
    }
    writer.flush().map_err(|e| PyValueError::new_err(e.to_string()))?;
    tracing::info!(input = input_path, records = count, encoded, "ndjson file normalized");
    Ok(count)
}

// Diagnostics go to an append-only file when the host names one. An
// unusable path is reported on stderr, since no subscriber exists yet.
fn init_diagnostics() {
    let Ok(path) = std::env::var(core::LOGGING_FILE_VAR) else {
        return;
    };
    let file = match core::open_log_file(&path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("recnorm_rs: diagnostics disabled: {e}");
            return;
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

#[pymodule]
#[pyo3(module = "recnorm_rs")]
fn recnorm_rs(_py: Python, m: &Bound<PyModule>) -> PyResult<()> {
    m.add(
        "__doc__",
        "Log-record normalization for schema-on-write sinks.\n\n\
        Features:\n\
        - Keep-list driven split of known fields vs. an 'undefined' bucket\n\
        - Recursive removal of empty fields and dotted-key sanitization\n\
        - Field-count cap with string fallback for the bucket\n\n\
        Quick start:\n\
        >>> import recnorm_rs as rn\n\
        >>> rn.load_config('path/to/undefined.json')\n\
        >>> record, changed, had_undefined = rn.normalize_json('{\"a\": 1}')",
    )?;

    m.add_function(wrap_pyfunction!(load_config, m)?)?;
    m.add_function(wrap_pyfunction!(set_config_json, m)?)?;
    m.add_function(wrap_pyfunction!(get_config_status, m)?)?;

    m.add_function(wrap_pyfunction!(normalize_json, m)?)?;
    m.add_function(wrap_pyfunction!(normalize_enriched, m)?)?;
    m.add_function(wrap_pyfunction!(normalize_batch, m)?)?;
    m.add_function(wrap_pyfunction!(normalize_file_to_ndjson, m)?)?;

    init_diagnostics();

    // Optional: preload options from env var for a faster startup in hot paths.
    if std::env::var(core::CONFIG_PATH_VAR).is_ok() {
        match NormalizerConfig::from_env() {
            Ok(cfg) => install_config(cfg)?,
            Err(e) => tracing::warn!(error = %e, "config preload failed"),
        }
    }

    Ok(())
}
