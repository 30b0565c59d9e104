//! ERA5 global reanalysis from the Copernicus Climate Data Store.
//!
//! Each raw file is one UTC day of one variable on the global 0.25° grid,
//! downloaded through the CDS retrieve API: submit a job, poll it until it is
//! done, then stream the result asset to disk.
//!
//! The CDS archives most single-level fields, the wave model ones included,
//! as GRIB edition 1. Only NetCDF downloads decode for every variable, so
//! NetCDF is the default whenever the `netcdf` feature is enabled.

use crate::decode::error::DecodeError;
use crate::decode::grib::decode_grib;
#[cfg(feature = "netcdf")]
use crate::decode::netcdf::decode_netcdf;
use crate::providers::credentials::CdsCredentials;
use crate::providers::error::ProviderError;
use crate::providers::Provider;
use crate::types::catalog::{Correction, Product, Variable};
use crate::types::region::BoundingBox;
use crate::types::sample::PointSample;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use futures_util::TryStreamExt;
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tokio_util::io::StreamReader;

const PROVIDER_NAME: &str = "era5";
const DEFAULT_DATASET: &str = "reanalysis-era5-single-levels";

pub const VARIABLES: [Variable; 12] = [
    Variable::new(
        "significant_height_of_combined_wind_waves_and_swell",
        "significant_height_of_combined_wind_waves_and_swell",
    ),
    Variable::new("mean_wave_direction", "mean_wave_direction"),
    Variable::new("mean_wave_period", "mean_wave_period"),
    Variable::new("10m_u_component_of_wind", "u_component_of_wind"),
    Variable::new("10m_v_component_of_wind", "v_component_of_wind"),
    Variable::new("convective_precipitation", "convective_precipitation"),
    Variable::new("convective_snowfall", "convective_snowfall"),
    Variable::new(
        "normalized_energy_flux_into_ocean",
        "normalized_energy_flux_into_ocean",
    ),
    Variable::new(
        "normalized_energy_flux_into_waves",
        "normalized_energy_flux_into_waves",
    ),
    Variable::new("normalized_stress_into_ocean", "normalized_stress_into_ocean"),
    Variable::new("precipitation_type", "precipitation_type"),
    Variable::new(
        "surface_solar_radiation_downwards",
        "surface_solar_radiation_downwards",
    ),
];

/// Short names of [`VARIABLES`] inside CDS NetCDF downloads.
const NETCDF_NAMES: [(&str, &str); 12] = [
    ("significant_height_of_combined_wind_waves_and_swell", "swh"),
    ("mean_wave_direction", "mwd"),
    ("mean_wave_period", "mwp"),
    ("10m_u_component_of_wind", "u10"),
    ("10m_v_component_of_wind", "v10"),
    ("convective_precipitation", "cp"),
    ("convective_snowfall", "csf"),
    ("normalized_energy_flux_into_ocean", "phioc"),
    ("normalized_energy_flux_into_waves", "phiaw"),
    ("normalized_stress_into_ocean", "tauoc"),
    ("precipitation_type", "ptype"),
    ("surface_solar_radiation_downwards", "ssrd"),
];

/// Name of `variable` inside a NetCDF download.
pub fn netcdf_name(variable: &Variable) -> &'static str {
    NETCDF_NAMES
        .iter()
        .find(|(name, _)| *name == variable.name)
        .map(|(_, short)| *short)
        .unwrap_or(variable.name)
}

pub const PRODUCTS: [Product; 14] = [
    Product::stored(
        "waveheight",
        "significant_height_of_combined_wind_waves_and_swell",
    ),
    Product::stored("wavedirection", "mean_wave_direction"),
    Product::stored("waveperiod", "mean_wave_period"),
    Product::stored("precipitation", "convective_precipitation"),
    Product::stored("snowfall", "convective_snowfall"),
    Product::stored("flux_ocean", "normalized_energy_flux_into_ocean"),
    Product::stored("flux_waves", "normalized_energy_flux_into_waves"),
    Product::stored("stress_ocean", "normalized_stress_into_ocean"),
    Product::stored("precip_type", "precipitation_type"),
    Product::stored("wind_u", "10m_u_component_of_wind"),
    Product::stored("wind_v", "10m_v_component_of_wind"),
    Product::magnitude("wind_uv", "10m_u_component_of_wind", "10m_v_component_of_wind"),
    Product::corrected(
        "insolation",
        "surface_solar_radiation_downwards",
        Correction::BIN_CENTRE,
    ),
    Product::corrected(
        "irradiance",
        "surface_solar_radiation_downwards",
        Correction::HOURLY_FLUX,
    ),
];

/// File format requested from the CDS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Era5Format {
    /// Needs the `netcdf` feature to decode.
    NetCdf,
    /// Only GRIB2 messages decode. GRIB1 files are rejected as unsupported.
    Grib,
}

impl Default for Era5Format {
    fn default() -> Self {
        if cfg!(feature = "netcdf") {
            Self::NetCdf
        } else {
            Self::Grib
        }
    }
}

impl Era5Format {
    /// Value of the `data_format` request field.
    pub fn data_format(self) -> &'static str {
        match self {
            Self::NetCdf => "netcdf",
            Self::Grib => "grib",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::NetCdf => "nc",
            Self::Grib => "grib",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Era5Config {
    /// `None` means look them up (environment, then `~/.cdsapirc`) on first fetch.
    pub credentials: Option<CdsCredentials>,
    pub dataset: String,
    pub format: Era5Format,
    pub poll_interval: Duration,
    /// Upper bound on how long one retrieval job may take, queueing included.
    pub timeout: Duration,
}

impl Default for Era5Config {
    fn default() -> Self {
        Self {
            credentials: None,
            dataset: DEFAULT_DATASET.to_string(),
            format: Era5Format::default(),
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    #[serde(rename = "jobID")]
    job_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct JobResults {
    asset: ResultAsset,
}

#[derive(Debug, Deserialize)]
struct ResultAsset {
    value: AssetValue,
}

#[derive(Debug, Deserialize)]
struct AssetValue {
    href: String,
}

pub struct Era5 {
    config: Era5Config,
    client: Client,
}

impl Default for Era5 {
    fn default() -> Self {
        Self::new(Era5Config::default())
    }
}

impl Era5 {
    pub fn new(config: Era5Config) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn credentials(&self) -> Result<CdsCredentials, ProviderError> {
        let credentials = match &self.config.credentials {
            Some(credentials) => credentials.clone(),
            None => CdsCredentials::discover()?,
        };
        if credentials.key.trim().is_empty() {
            return Err(auth_error("the CDS API key is empty".to_string()));
        }
        Ok(credentials)
    }

    /// Inputs of a retrieve job for all 24 hours of `day`.
    pub fn request_inputs(&self, variable: &Variable, day: NaiveDate) -> serde_json::Value {
        let times: Vec<String> = (0..24).map(|hour| format!("{hour:02}:00")).collect();
        json!({
            "product_type": ["reanalysis"],
            "variable": [variable.name],
            "year": [format!("{:04}", day.year())],
            "month": [format!("{:02}", day.month())],
            "day": [format!("{:02}", day.day())],
            "time": times,
            "grid": [0.25, 0.25],
            "data_format": self.config.format.data_format(),
            "download_format": "unarchived",
        })
    }

    fn api_url(credentials: &CdsCredentials, path: &str) -> String {
        format!(
            "{}/retrieve/v1/{}",
            credentials.url.trim_end_matches('/'),
            path
        )
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Response, ProviderError> {
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::NetworkRequest(url.to_string(), e))?;
        match response.error_for_status() {
            Ok(resp) => Ok(resp),
            Err(e) => {
                warn!("HTTP error for {}: {:?}", url, e);
                Err(match e.status() {
                    Some(status)
                        if status == StatusCode::UNAUTHORIZED
                            || status == StatusCode::FORBIDDEN =>
                    {
                        auth_error(format!("{url} answered {status}"))
                    }
                    Some(status) => ProviderError::HttpStatus {
                        url: url.to_string(),
                        status,
                        source: e,
                    },
                    None => ProviderError::NetworkRequest(url.to_string(), e),
                })
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        credentials: &CdsCredentials,
        url: &str,
    ) -> Result<T, ProviderError> {
        let request = self
            .client
            .get(url)
            .header("PRIVATE-TOKEN", &credentials.key);
        self.send(url, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ProviderError::UnexpectedResponse {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    async fn submit(
        &self,
        credentials: &CdsCredentials,
        inputs: serde_json::Value,
    ) -> Result<JobStatus, ProviderError> {
        let url = Self::api_url(
            credentials,
            &format!("processes/{}/execute", self.config.dataset),
        );
        let request = self
            .client
            .post(&url)
            .header("PRIVATE-TOKEN", &credentials.key)
            .json(&json!({ "inputs": inputs }));
        self.send(&url, request)
            .await?
            .json::<JobStatus>()
            .await
            .map_err(|e| ProviderError::UnexpectedResponse {
                url,
                message: e.to_string(),
            })
    }

    async fn wait_for(
        &self,
        credentials: &CdsCredentials,
        mut job: JobStatus,
    ) -> Result<String, ProviderError> {
        let url = Self::api_url(credentials, &format!("jobs/{}", job.job_id));
        let started = Instant::now();
        loop {
            match job.status.as_str() {
                "successful" => break,
                "failed" | "rejected" | "dismissed" => {
                    return Err(ProviderError::JobFailed {
                        job: job.job_id,
                        message: format!("job ended with status '{}'", job.status),
                    });
                }
                status => debug!("ERA5 job {} is {}", job.job_id, status),
            }
            if started.elapsed() >= self.config.timeout {
                return Err(ProviderError::Timeout {
                    job: job.job_id,
                    seconds: self.config.timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
            job = self.get_json(credentials, &url).await?;
        }

        let results: JobResults = self
            .get_json(credentials, &format!("{url}/results"))
            .await?;
        Ok(results.asset.value.href)
    }

    /// Streams `href` into a temporary file next to `target`, then moves it into place,
    /// so an interrupted download never leaves a partial raw file behind.
    async fn download(&self, href: &str, target: &Path) -> Result<u64, ProviderError> {
        let response = self.send(href, self.client.get(href)).await?;

        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        let temp_file =
            NamedTempFile::new_in(parent).map_err(|e| ProviderError::Io(target.to_path_buf(), e))?;
        let std_file = temp_file
            .as_file()
            .try_clone()
            .map_err(|e| ProviderError::Io(target.to_path_buf(), e))?;
        let mut out = tokio::fs::File::from_std(std_file);

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let mut reader = StreamReader::new(Box::pin(stream));
        let bytes = tokio::io::copy(&mut reader, &mut out).await?;
        out.sync_all()
            .await
            .map_err(|e| ProviderError::Io(target.to_path_buf(), e))?;
        drop(out);

        temp_file
            .persist(target)
            .map_err(|e| ProviderError::Io(target.to_path_buf(), e.error))?;
        Ok(bytes)
    }
}

fn auth_error(message: String) -> ProviderError {
    ProviderError::Auth {
        provider: PROVIDER_NAME.to_string(),
        message,
    }
}

#[async_trait]
impl Provider for Era5 {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn subsets_server_side(&self) -> bool {
        false
    }

    fn variables(&self) -> &[Variable] {
        &VARIABLES
    }

    fn products(&self) -> &[Product] {
        &PRODUCTS
    }

    fn raw_file_name(&self, variable: &Variable, _region: &BoundingBox, day: NaiveDate) -> String {
        format!(
            "ERA5_reanalysis_{}_{}.{}",
            variable.name,
            day.format("%Y-%m-%d"),
            self.config.format.extension()
        )
    }

    async fn fetch(
        &self,
        variable: &Variable,
        _region: &BoundingBox,
        day: NaiveDate,
        target: &Path,
    ) -> Result<(), ProviderError> {
        let credentials = self.credentials()?;
        info!("Requesting ERA5 {} for {} from {}", variable, day, credentials.url);

        let job = self
            .submit(&credentials, self.request_inputs(variable, day))
            .await?;
        let job_id = job.job_id.clone();
        let href = self.wait_for(&credentials, job).await?;
        let bytes = self.download(&href, target).await?;
        info!(
            "Downloaded {} bytes for ERA5 job {} to {:?}",
            bytes, job_id, target
        );

        if !tokio::fs::try_exists(target).await.unwrap_or(false) {
            return Err(ProviderError::MissingOutput(target.to_path_buf()));
        }
        Ok(())
    }

    fn decode(
        &self,
        raw_file: &Path,
        variable: &Variable,
        region: &BoundingBox,
    ) -> Result<Vec<PointSample>, DecodeError> {
        match self.config.format {
            Era5Format::Grib => decode_grib(raw_file, region, PROVIDER_NAME),
            #[cfg(feature = "netcdf")]
            Era5Format::NetCdf => {
                decode_netcdf(raw_file, netcdf_name(variable), region, PROVIDER_NAME)
            }
            #[cfg(not(feature = "netcdf"))]
            Era5Format::NetCdf => Err(DecodeError::Unsupported {
                path: raw_file.to_path_buf(),
                reason: format!(
                    "NetCDF support for {} is not compiled in (enable the `netcdf` feature)",
                    netcdf_name(variable)
                ),
            }),
        }
    }
}
