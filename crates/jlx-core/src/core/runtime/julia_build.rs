use std::collections::HashMap;
use std::env;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use dirs_next::home_dir;
use flate2::read::GzDecoder;
use jlx_domain::parse_runtime_version;
use reqwest::blocking::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tar::Archive;
use tempfile::{tempdir_in, NamedTempFile, TempDir, TempPath};
use zip::ZipArchive;

use super::effects::InstallRequest;
use super::net::build_http_client;

const DEFAULT_VERSIONS_URL: &str = "https://julialang-s3.julialang.org/bin/versions.json";
pub(crate) const VERSIONS_URL_ENV: &str = "JLX_JULIA_VERSIONS_URL";

enum ManifestSource {
    Http(String),
    File(PathBuf),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct HostTarget {
    os: &'static str,
    arch: &'static str,
    extension: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ArchiveKind {
    TarGz,
    Zip,
}

#[derive(Deserialize, Clone, Debug)]
struct ReleaseEntry {
    files: Vec<ReleaseFile>,
    #[serde(default)]
    stable: bool,
}

#[derive(Deserialize, Clone, Debug)]
struct ReleaseFile {
    url: String,
    #[serde(default)]
    sha256: Option<String>,
    os: String,
    arch: String,
    kind: String,
    extension: String,
    version: String,
}

#[derive(Clone, Debug)]
struct SelectedAsset {
    version: String,
    name: String,
    url: String,
    sha256: Option<String>,
    kind: ArchiveKind,
}

/// Download the newest matching official build into `root/julia-<major.minor>`.
///
/// Returns the path of the installed `julia` executable.
///
/// # Errors
/// Returns an error if no build satisfies the request on this platform, the
/// download fails its checksum, or the archive cannot be extracted.
pub(crate) fn install_julia(root: &Path, request: &InstallRequest) -> Result<PathBuf> {
    let target = detect_host_target()?;
    let client = build_http_client()?;
    let releases = load_versions_manifest(&client)?;
    let asset = select_release_asset(request, target, &releases)?;
    tracing::info!(version = %asset.version, url = %asset.url, "downloading julia");
    let download = download_asset(&client, &asset)?;
    install_from_archive(root, &asset, download.as_ref())
}

fn install_from_archive(root: &Path, asset: &SelectedAsset, archive: &Path) -> Result<PathBuf> {
    if let Some(expected) = &asset.sha256 {
        verify_sha256(archive, expected)?;
    }
    fs::create_dir_all(root)
        .with_context(|| format!("creating julia install root at {}", root.display()))?;
    let stage = create_stage_dir(root)?;
    extract_archive(archive, stage.path(), asset.kind)?;
    let content = single_child_dir(stage.path())?.unwrap_or_else(|| stage.path().to_path_buf());
    if !julia_binary(&content).is_file() {
        bail!("downloaded archive {} has no bin/julia", asset.name);
    }
    let install_path = root.join(format!("julia-{}", release_key(&asset.version)?));
    if install_path.exists() {
        fs::remove_dir_all(&install_path)
            .with_context(|| format!("removing previous runtime at {}", install_path.display()))?;
    }
    let moved = fs::rename(&content, &install_path);
    // The stage is dropped (and removed) on both paths.
    drop(stage);
    moved.with_context(|| {
        format!(
            "moving julia runtime into place at {}",
            install_path.display()
        )
    })?;
    Ok(julia_binary(&install_path))
}

pub(crate) fn julia_binary(root: &Path) -> PathBuf {
    let name = if cfg!(windows) { "julia.exe" } else { "julia" };
    root.join("bin").join(name)
}

pub(crate) fn default_install_root() -> Result<PathBuf> {
    if let Some(root) = env::var_os("JILL_INSTALL_DIR") {
        return Ok(PathBuf::from(root));
    }
    if cfg!(windows) {
        dirs_next::data_local_dir()
            .map(|dir| dir.join("julias"))
            .ok_or_else(|| anyhow!("local data directory not found"))
    } else {
        home_dir()
            .map(|home| home.join("packages").join("julias"))
            .ok_or_else(|| anyhow!("home directory not found"))
    }
}

pub(crate) fn detect_host_target() -> Result<HostTarget> {
    let os = match env::consts::OS {
        "linux" => "linux",
        "macos" => "mac",
        "windows" => "winnt",
        "freebsd" => "freebsd",
        other => bail!("unsupported host platform {other} for julia downloads"),
    };
    let arch = match env::consts::ARCH {
        "x86_64" => "x86_64",
        "aarch64" => "aarch64",
        "x86" => "i686",
        other => bail!("unsupported host architecture {other} for julia downloads"),
    };
    let extension = if os == "winnt" { "zip" } else { "tar.gz" };
    Ok(HostTarget {
        os,
        arch,
        extension,
    })
}

fn load_versions_manifest(client: &Client) -> Result<HashMap<String, ReleaseEntry>> {
    let raw_source =
        env::var(VERSIONS_URL_ENV).unwrap_or_else(|_| DEFAULT_VERSIONS_URL.to_string());
    let source = if let Some(path) = raw_source.strip_prefix("file://") {
        ManifestSource::File(PathBuf::from(path))
    } else if raw_source.starts_with("http://") || raw_source.starts_with("https://") {
        ManifestSource::Http(raw_source)
    } else {
        ManifestSource::File(PathBuf::from(raw_source))
    };

    let bytes = match fetch_manifest_bytes(client, &source) {
        Ok(bytes) => bytes,
        Err(err) => match read_manifest_cache()? {
            Some(bytes) => {
                tracing::warn!(error = %err, "using cached julia versions manifest");
                bytes
            }
            None => return Err(err.context("failed to fetch julia versions manifest")),
        },
    };
    let releases = parse_manifest(&bytes)?;
    if matches!(source, ManifestSource::Http(_)) {
        let _ = write_manifest_cache(&bytes);
    }
    Ok(releases)
}

fn fetch_manifest_bytes(client: &Client, source: &ManifestSource) -> Result<Vec<u8>> {
    match source {
        ManifestSource::Http(url) => {
            let response = client
                .get(url)
                .send()
                .with_context(|| format!("failed to download julia versions from {url}"))?
                .error_for_status()
                .with_context(|| format!("julia versions request failed ({url})"))?;
            response
                .bytes()
                .map(|bytes| bytes.to_vec())
                .context("failed to read julia versions body")
        }
        ManifestSource::File(path) => fs::read(path)
            .with_context(|| format!("reading julia versions manifest at {}", path.display())),
    }
}

fn parse_manifest(bytes: &[u8]) -> Result<HashMap<String, ReleaseEntry>> {
    serde_json::from_slice(bytes).context("invalid julia versions manifest")
}

fn manifest_cache_path() -> Result<PathBuf> {
    let home = home_dir().ok_or_else(|| anyhow!("home directory not found"))?;
    let cache_dir = home.join(".jlx").join("cache");
    fs::create_dir_all(&cache_dir)
        .with_context(|| format!("creating cache directory at {}", cache_dir.display()))?;
    Ok(cache_dir.join("julia-versions.json"))
}

fn write_manifest_cache(bytes: &[u8]) -> Result<()> {
    let path = manifest_cache_path()?;
    fs::write(path, bytes).context("writing cached julia versions manifest")
}

fn read_manifest_cache() -> Result<Option<Vec<u8>>> {
    let path = manifest_cache_path()?;
    if path.exists() {
        fs::read(&path)
            .map(Some)
            .with_context(|| format!("reading cached julia versions at {}", path.display()))
    } else {
        Ok(None)
    }
}

fn select_release_asset(
    request: &InstallRequest,
    target: HostTarget,
    releases: &HashMap<String, ReleaseEntry>,
) -> Result<SelectedAsset> {
    let mut candidates: Vec<(semver::Version, &ReleaseFile)> = releases
        .values()
        .filter(|entry| entry.stable || !request.constraint.strict())
        .flat_map(|entry| entry.files.iter())
        .filter(|file| {
            file.kind == "archive"
                && file.os == target.os
                && file.arch == target.arch
                && file.extension == target.extension
                && request.constraint.satisfies(&file.version)
        })
        .filter_map(|file| parse_runtime_version(&file.version).map(|version| (version, file)))
        .collect();
    candidates.sort_by(|(left, _), (right, _)| right.cmp(left));

    let chosen = request
        .preferred
        .iter()
        .find_map(|preferred| {
            if preferred == "latest" {
                return candidates.first();
            }
            let (major, minor) = parse_channel_pair(preferred).ok()?;
            candidates
                .iter()
                .find(|(version, _)| version.major == major && version.minor == minor)
        })
        .or_else(|| candidates.first());
    let Some((_, file)) = chosen else {
        bail!(
            "no julia release satisfying `{}` is available for {}-{}",
            request.constraint.spec(),
            target.os,
            target.arch
        );
    };
    let name = filename_from_url(&file.url);
    Ok(SelectedAsset {
        version: file.version.clone(),
        kind: archive_kind(&name)?,
        name,
        url: file.url.clone(),
        sha256: file.sha256.clone(),
    })
}

fn filename_from_url(url: &str) -> String {
    url.rsplit('/').next().unwrap_or("julia.tar.gz").to_string()
}

fn archive_kind(name: &str) -> Result<ArchiveKind> {
    if name.ends_with(".tar.gz") {
        Ok(ArchiveKind::TarGz)
    } else if name.ends_with(".zip") {
        Ok(ArchiveKind::Zip)
    } else {
        bail!("unsupported archive format for {name}")
    }
}

fn download_asset(client: &Client, asset: &SelectedAsset) -> Result<TempPath> {
    let mut response = client
        .get(&asset.url)
        .send()
        .with_context(|| format!("failed to download {}", asset.name))?
        .error_for_status()
        .with_context(|| format!("download failed for {}", asset.name))?;
    let mut file = NamedTempFile::new().context("creating temporary file for julia runtime")?;
    response
        .copy_to(file.as_file_mut())
        .with_context(|| format!("failed to write {}", asset.name))?;
    Ok(file.into_temp_path())
}

fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let mut file =
        File::open(path).with_context(|| format!("opening download {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }
    let actual = hex::encode(hasher.finalize());
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        bail!("checksum mismatch: expected {expected}, got {actual}");
    }
    Ok(())
}

fn create_stage_dir(root: &Path) -> Result<TempDir> {
    tempdir_in(root).with_context(|| format!("creating staging directory under {}", root.display()))
}

fn extract_archive(archive: &Path, dest: &Path, kind: ArchiveKind) -> Result<()> {
    let file = File::open(archive)
        .with_context(|| format!("opening julia archive {}", archive.display()))?;
    match kind {
        ArchiveKind::TarGz => {
            let mut tar = Archive::new(GzDecoder::new(file));
            tar.unpack(dest)
                .with_context(|| format!("extracting archive into {}", dest.display()))?;
        }
        ArchiveKind::Zip => {
            let mut archive = ZipArchive::new(file)
                .with_context(|| format!("reading zip archive {}", archive.display()))?;
            archive
                .extract(dest)
                .with_context(|| format!("extracting zip archive into {}", dest.display()))?;
        }
    }
    Ok(())
}

fn single_child_dir(dir: &Path) -> io::Result<Option<PathBuf>> {
    let entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<io::Result<_>>()?;
    match entries.as_slice() {
        [only] if only.is_dir() => Ok(Some(only.clone())),
        _ => Ok(None),
    }
}

pub(crate) fn parse_channel_pair(input: &str) -> Result<(u64, u64)> {
    let mut parts = input.split('.');
    let major = parts
        .next()
        .ok_or_else(|| anyhow!("julia version missing major component"))?
        .parse()?;
    let minor = parts
        .next()
        .ok_or_else(|| anyhow!("julia version missing minor component"))?
        .parse()?;
    Ok((major, minor))
}

/// `1.9.3` becomes the install key `1.9`.
fn release_key(version: &str) -> Result<String> {
    let parsed = parse_runtime_version(version)
        .ok_or_else(|| anyhow!("invalid julia version `{version}`"))?;
    Ok(format!("{}.{}", parsed.major, parsed.minor))
}
