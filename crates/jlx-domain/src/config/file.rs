use std::fs;
use std::path::{Path, PathBuf};

use toml_edit::{DocumentMut, Item, Table};

use super::{ConfigError, ProjectConfigBuilder, PROJECT_FILES};

pub const CONFIG_FILENAME: &str = "jlx.toml";

/// Nearest directory at or above `start` holding `jlx.toml` or a julia
/// project file.
#[must_use]
pub fn discover_project_root(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join(CONFIG_FILENAME).is_file()
            || PROJECT_FILES.iter().any(|file| dir.join(file).is_file())
        {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Reads `jlx.toml` from `root` into a builder the caller can refine.
///
/// Without a config file the project name falls back to the `name` key of
/// the package's `Project.toml`.
///
/// # Errors
/// Returns [`ConfigError::File`] when the file cannot be read or parsed, or a
/// value error when a key carries the wrong type.
pub fn load_project_config(root: &Path) -> Result<ProjectConfigBuilder, ConfigError> {
    let path = root.join(CONFIG_FILENAME);
    if !path.is_file() {
        let name = project_name_from_manifest(root)?;
        return Ok(ProjectConfigBuilder::new(name, root));
    }
    let doc = read_document(&path)?;
    let project = doc
        .get("project")
        .and_then(Item::as_table)
        .ok_or_else(|| file_error(&path, "[project] table not found"))?;
    let name = match string_key(project, "name")? {
        Some(name) => name,
        None => project_name_from_manifest(root)?,
    };
    let mut builder = ProjectConfigBuilder::new(name, root);

    if let Some(spec) = string_key(project, "version-spec")? {
        builder = builder.version_spec(spec);
    }
    if let Some(strict) = bool_key(project, "strict-version")? {
        builder = builder.strict_version(strict);
    }
    if let Some(versions) = string_array_key(project, "preferred-versions")? {
        builder = builder.preferred_versions(versions);
    }
    if let Some(prefix) = string_key(project, "env-prefix")? {
        builder = builder.env_prefix(prefix);
    }
    if let Some(bridge) = string_key(project, "bridge")? {
        builder = builder.bridge(bridge.parse()?);
    }
    if let Some(depot) = string_key(project, "depot")? {
        builder = builder.store_mode(depot.parse()?);
    }
    if let Some(dir) = string_key(project, "sys-image-dir")? {
        builder = builder.image_dir(dir);
    }
    if let Some(base) = string_key(project, "sys-image-file-base")? {
        builder = builder.image_file_base(base);
    }
    if let Some(script) = string_key(project, "build-script")? {
        builder = builder.build_script(script);
    }
    if let Some(enabled) = bool_key(project, "use-sys-image")? {
        builder = builder.use_image(enabled);
    }
    if let Some(lib) = string_key(project, "host-library")? {
        builder = builder.host_library(resolve_relative(root, &lib));
    }
    if let Some(exe) = string_key(project, "host-executable")? {
        builder = builder.host_executable(resolve_relative(root, &exe));
    }
    if let Some(julia) = string_key(project, "julia")? {
        builder = builder.runtime_path(resolve_relative(root, &julia));
    }
    if let Some(code) = string_key(project, "pre-instantiate")? {
        builder = builder.pre_instantiate(code);
    }
    if let Some(argv) = string_array_key(project, "post-init")? {
        builder = builder.post_init_command(argv);
    }

    if let Some(registries) = doc.get("registries") {
        let table = registries
            .as_table()
            .ok_or_else(|| file_error(&path, "[registries] must be a table"))?;
        for (name, item) in table {
            let url = item.as_str().ok_or_else(|| ConfigError::InvalidValue {
                key: format!("registries.{name}"),
                value: item.to_string().trim().to_string(),
            })?;
            builder = builder.registry(name, url);
        }
    }
    Ok(builder)
}

/// Package names under `[deps]` of a julia project file.
///
/// # Errors
/// Returns [`ConfigError::File`] when the file cannot be read or parsed.
pub fn declared_deps(project_file: &Path) -> Result<Vec<String>, ConfigError> {
    let doc = read_document(project_file)?;
    Ok(doc
        .get("deps")
        .and_then(Item::as_table_like)
        .map(|deps| deps.iter().map(|(name, _)| name.to_string()).collect())
        .unwrap_or_default())
}

fn project_name_from_manifest(root: &Path) -> Result<String, ConfigError> {
    for file in PROJECT_FILES {
        let path = root.join(file);
        if !path.is_file() {
            continue;
        }
        let doc = read_document(&path)?;
        if let Some(name) = doc.get("name").and_then(Item::as_str) {
            return Ok(name.to_string());
        }
    }
    Err(file_error(
        &root.join(CONFIG_FILENAME),
        "no project name configured and no named Project.toml found",
    ))
}

fn read_document(path: &Path) -> Result<DocumentMut, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|err| file_error(path, &err.to_string()))?;
    contents
        .parse::<DocumentMut>()
        .map_err(|err| file_error(path, &err.to_string()))
}

fn file_error(path: &Path, reason: &str) -> ConfigError {
    ConfigError::File {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn invalid(key: &str, item: &Item) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: item.to_string().trim().to_string(),
    }
}

fn string_key(table: &Table, key: &str) -> Result<Option<String>, ConfigError> {
    match table.get(key) {
        None => Ok(None),
        Some(item) => item
            .as_str()
            .map(|value| Some(value.to_string()))
            .ok_or_else(|| invalid(key, item)),
    }
}

fn bool_key(table: &Table, key: &str) -> Result<Option<bool>, ConfigError> {
    match table.get(key) {
        None => Ok(None),
        Some(item) => item.as_bool().map(Some).ok_or_else(|| invalid(key, item)),
    }
}

fn string_array_key(table: &Table, key: &str) -> Result<Option<Vec<String>>, ConfigError> {
    let Some(item) = table.get(key) else {
        return Ok(None);
    };
    let array = item.as_array().ok_or_else(|| invalid(key, item))?;
    array
        .iter()
        .map(|value| value.as_str().map(ToString::to_string))
        .collect::<Option<Vec<_>>>()
        .map(Some)
        .ok_or_else(|| invalid(key, item))
}

fn resolve_relative(root: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}
