//! CMEMS global ocean currents, subset on the server by the `copernicusmarine`
//! command line tool and delivered as NetCDF.
//!
//! The tool writes to a temporary file next to the raw file, which is only
//! renamed into place after a successful exit.

use crate::decode::error::DecodeError;
use crate::providers::error::ProviderError;
use crate::providers::Provider;
use crate::types::catalog::{Product, Variable};
use crate::types::region::BoundingBox;
use crate::types::sample::PointSample;
use async_trait::async_trait;
use chrono::{NaiveDate, TimeDelta};
use log::{debug, info};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::process::Command;

const PROVIDER_NAME: &str = "cmems";
const DEFAULT_DATASET: &str = "cmems_mod_glo_phy_anfc_merged-uv_PT1H-i";
const DEFAULT_PROGRAM: &str = "copernicusmarine";

pub const VARIABLES: [Variable; 2] = [
    Variable::new("utotal", "water_u"),
    Variable::new("vtotal", "water_v"),
];

pub const PRODUCTS: [Product; 3] = [
    Product::stored("water_u", "utotal"),
    Product::stored("water_v", "vtotal"),
    Product::magnitude("water_uv", "utotal", "vtotal"),
];

#[derive(Debug, Clone)]
pub struct CmemsConfig {
    /// Looked up on `PATH` when not absolute.
    pub program: PathBuf,
    pub dataset: String,
    pub min_depth: f64,
    pub max_depth: f64,
}

impl Default for CmemsConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            dataset: DEFAULT_DATASET.to_string(),
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Cmems {
    config: CmemsConfig,
}

impl Cmems {
    pub fn new(config: CmemsConfig) -> Self {
        Self { config }
    }

    /// Arguments of `copernicusmarine subset` for one day of `variable` inside
    /// `region`, written to `output`.
    pub fn subset_args(
        &self,
        variable: &Variable,
        region: &BoundingBox,
        day: NaiveDate,
        output: &Path,
    ) -> Vec<String> {
        let start = day.and_time(chrono::NaiveTime::MIN);
        let end = start + TimeDelta::days(1);
        let directory = output
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ".".to_string());
        let file_name = output
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        vec![
            "subset".to_string(),
            "--dataset-id".to_string(),
            self.config.dataset.clone(),
            "--variable".to_string(),
            variable.name.to_string(),
            "--minimum-longitude".to_string(),
            region.west().to_string(),
            "--maximum-longitude".to_string(),
            region.east().to_string(),
            "--minimum-latitude".to_string(),
            region.south().to_string(),
            "--maximum-latitude".to_string(),
            region.north().to_string(),
            "--start-datetime".to_string(),
            start.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "--end-datetime".to_string(),
            end.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "--minimum-depth".to_string(),
            self.config.min_depth.to_string(),
            "--maximum-depth".to_string(),
            self.config.max_depth.to_string(),
            "--output-directory".to_string(),
            directory,
            "--output-filename".to_string(),
            file_name,
            "--overwrite".to_string(),
            "--disable-progress-bar".to_string(),
        ]
    }
}

/// Moves the tool's output into place. An empty file means the tool wrote nothing.
async fn persist_output(partial: NamedTempFile, target: &Path) -> Result<(), ProviderError> {
    let written = tokio::fs::metadata(partial.path())
        .await
        .map(|metadata| metadata.len())
        .unwrap_or(0);
    if written == 0 {
        return Err(ProviderError::MissingOutput(target.to_path_buf()));
    }
    partial
        .persist(target)
        .map_err(|e| ProviderError::Io(target.to_path_buf(), e.error))?;
    debug!("Moved {} bytes of CMEMS output to {:?}", written, target);
    Ok(())
}

/// The toolbox does not have a dedicated exit code for bad credentials.
fn looks_like_auth_failure(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    ["credentials", "unauthorized", "authentication", "401", "invalid username"]
        .iter()
        .any(|needle| stderr.contains(needle))
}

#[async_trait]
impl Provider for Cmems {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn subsets_server_side(&self) -> bool {
        true
    }

    fn variables(&self) -> &[Variable] {
        &VARIABLES
    }

    fn products(&self) -> &[Product] {
        &PRODUCTS
    }

    fn raw_file_name(&self, variable: &Variable, region: &BoundingBox, day: NaiveDate) -> String {
        format!(
            "{}_{}W{}E{}S{}N_{}.nc",
            variable.name,
            region.west(),
            region.east(),
            region.south(),
            region.north(),
            day.format("%Y%m%d")
        )
    }

    async fn fetch(
        &self,
        variable: &Variable,
        region: &BoundingBox,
        day: NaiveDate,
        target: &Path,
    ) -> Result<(), ProviderError> {
        let program = self.config.program.display().to_string();
        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        // Removed on drop, so a failed run leaves nothing behind.
        let partial = tempfile::Builder::new()
            .prefix(".cmems-")
            .suffix(".nc")
            .tempfile_in(parent)
            .map_err(|e| ProviderError::Io(target.to_path_buf(), e))?;
        let args = self.subset_args(variable, region, day, partial.path());
        info!("Requesting CMEMS {} for {} in {}", variable, day, region);
        debug!("Running {} {}", program, args.join(" "));

        let output = Command::new(&self.config.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| ProviderError::ToolLaunch(program.clone(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if looks_like_auth_failure(&stderr) {
                return Err(ProviderError::Auth {
                    provider: PROVIDER_NAME.to_string(),
                    message: stderr,
                });
            }
            return Err(ProviderError::Tool {
                program,
                status: output.status,
                stderr,
            });
        }

        persist_output(partial, target).await
    }

    #[cfg(feature = "netcdf")]
    fn decode(
        &self,
        raw_file: &Path,
        variable: &Variable,
        region: &BoundingBox,
    ) -> Result<Vec<PointSample>, DecodeError> {
        crate::decode::netcdf::decode_netcdf(raw_file, variable.name, region, PROVIDER_NAME)
    }

    #[cfg(not(feature = "netcdf"))]
    fn decode(
        &self,
        raw_file: &Path,
        _variable: &Variable,
        _region: &BoundingBox,
    ) -> Result<Vec<PointSample>, DecodeError> {
        Err(DecodeError::Unsupported {
            path: raw_file.to_path_buf(),
            reason: "NetCDF support is disabled; enable the `netcdf` feature".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> BoundingBox {
        BoundingBox::new(-64.4, -63.4, 46.1, 47.0).unwrap()
    }

    #[test]
    fn test_raw_file_name_encodes_region() {
        let cmems = Cmems::default();
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let name = cmems.raw_file_name(&VARIABLES[0], &region(), day);
        assert_eq!(name, "utotal_-64.4W-63.4E46.1S47N_20240501.nc");
        let other = cmems.raw_file_name(&VARIABLES[0], &BoundingBox::global(), day);
        assert_ne!(name, other);
    }

    #[test]
    fn test_subset_args_cover_one_day() {
        let cmems = Cmems::default();
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let target = Path::new("/tmp/cmems/utotal.nc");
        let args = cmems.subset_args(&VARIABLES[0], &region(), day, target);
        let value_of = |flag: &str| {
            let i = args.iter().position(|a| a == flag).unwrap();
            args[i + 1].clone()
        };
        assert_eq!(args[0], "subset");
        assert_eq!(value_of("--dataset-id"), DEFAULT_DATASET);
        assert_eq!(value_of("--minimum-longitude"), "-64.4");
        assert_eq!(value_of("--maximum-latitude"), "47");
        assert_eq!(value_of("--start-datetime"), "2024-05-01T00:00:00");
        assert_eq!(value_of("--end-datetime"), "2024-05-02T00:00:00");
        assert_eq!(value_of("--output-filename"), "utotal.nc");
        assert_eq!(value_of("--output-directory"), "/tmp/cmems");
    }

    #[test]
    fn test_auth_detection() {
        assert!(looks_like_auth_failure("ERROR: Invalid credentials"));
        assert!(looks_like_auth_failure("HTTP 401 Unauthorized"));
        assert!(!looks_like_auth_failure("dataset not found"));
    }

    #[tokio::test]
    async fn test_missing_tool_is_launch_error() {
        let cmems = Cmems::new(CmemsConfig {
            program: PathBuf::from("/nonexistent/copernicusmarine"),
            ..CmemsConfig::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let result = cmems
            .fetch(
                &VARIABLES[0],
                &region(),
                NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                &dir.path().join("out.nc"),
            )
            .await;
        assert!(matches!(result, Err(ProviderError::ToolLaunch(..))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_without_output_is_integrity_error() {
        // `true` accepts any arguments and exits 0 without writing anything.
        let cmems = Cmems::new(CmemsConfig {
            program: PathBuf::from("true"),
            ..CmemsConfig::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.nc");
        let result = cmems
            .fetch(
                &VARIABLES[0],
                &region(),
                NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                &target,
            )
            .await;
        assert!(matches!(result, Err(ProviderError::MissingOutput(p)) if p == target));
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    /// A stand-in for `copernicusmarine` that writes `body` to the requested
    /// output file, then exits with `code`.
    #[cfg(unix)]
    fn fake_tool(dir: &Path, body: &str, code: i32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake_copernicusmarine.sh");
        let script = format!(
            r#"#!/bin/sh
dir=.
name=
while [ $# -gt 0 ]; do
  case "$1" in
    --output-directory) dir="$2"; shift ;;
    --output-filename) name="$2"; shift ;;
  esac
  shift
done
printf '%s' '{body}' > "$dir/$name"
echo "connection reset by peer" >&2
exit {code}
"#
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_run_leaves_no_partial_raw_file() {
        let tools = tempfile::tempdir().unwrap();
        let cmems = Cmems::new(CmemsConfig {
            program: fake_tool(tools.path(), "CDF half a file", 1),
            ..CmemsConfig::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("utotal.nc");
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let result = cmems.fetch(&VARIABLES[0], &region(), day, &target).await;
        assert!(matches!(result, Err(ProviderError::Tool { .. })));
        // Nothing the cache could mistake for a complete download.
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_is_moved_into_place() {
        let tools = tempfile::tempdir().unwrap();
        let cmems = Cmems::new(CmemsConfig {
            program: fake_tool(tools.path(), "CDF whole file", 0),
            ..CmemsConfig::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("utotal.nc");
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        cmems
            .fetch(&VARIABLES[0], &region(), day, &target)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "CDF whole file");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(not(feature = "netcdf"))]
    #[test]
    fn test_decode_without_netcdf_support() {
        let cmems = Cmems::default();
        let result = cmems.decode(Path::new("x.nc"), &VARIABLES[0], &region());
        assert!(matches!(result, Err(DecodeError::Unsupported { .. })));
    }
}
