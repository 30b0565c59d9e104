use crate::error::GeofetchError;
use crate::index::{dataset_key, FetchIndex};
use crate::pipeline::orchestrator::FetchOrchestrator;
use crate::providers::Provider;
use crate::store::PointStore;
use crate::types::catalog::{Product, ProductKind, Variable};
use crate::types::region::BoundingBox;
use crate::types::sample::PointSeries;
use crate::types::time::TimeRange;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Serves `load` requests: optionally fetches whatever the index does not
/// cover yet, then reads the product from the point store.
pub struct QueryLayer {
    orchestrator: FetchOrchestrator,
    store: PointStore,
    index: Mutex<Box<dyn FetchIndex>>,
}

impl QueryLayer {
    pub fn new(
        orchestrator: FetchOrchestrator,
        store: PointStore,
        index: Box<dyn FetchIndex>,
    ) -> Self {
        Self {
            orchestrator,
            store,
            index: Mutex::new(index),
        }
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator {
        &self.orchestrator
    }

    fn resolve(provider: &dyn Provider, name: &str) -> Result<Variable, GeofetchError> {
        provider
            .variable(name)
            .ok_or_else(|| GeofetchError::InvalidVariable {
                provider: provider.name().to_string(),
                name: name.to_string(),
                valid: provider
                    .variables()
                    .iter()
                    .map(|v| v.name.to_string())
                    .collect(),
            })
    }

    /// Fetches every UTC day of `range` not yet covered for `variable`, one day at a time.
    ///
    /// The index stays locked from the coverage check to the record, so
    /// concurrent loads of the same day wait for each other instead of both
    /// asking the provider.
    async fn fill_gaps(
        &self,
        provider: &Arc<dyn Provider>,
        variable: &Variable,
        region: &BoundingBox,
        range: &TimeRange,
    ) -> Result<(), GeofetchError> {
        let dataset = dataset_key(provider.name(), variable.table);
        let mut index = self.index.lock().await;
        // Coverage outlives a deleted or replaced database, the rows do not.
        let mut table_exists = self.store.table_exists(variable.table).await?;
        for day in range.days() {
            let day_range = TimeRange::for_day(day);
            if index.covers(&dataset, region, &day_range) {
                if table_exists {
                    debug!("{} already fetched for {} on {}", dataset, region, day);
                    continue;
                }
                warn!(
                    "{} is recorded as fetched for {} on {} but table {} is missing, fetching again",
                    dataset, region, day, variable.table
                );
            }
            if let Err(e) = self
                .orchestrator
                .fetch(provider, variable, region, day)
                .await
            {
                error!(
                    "Failed to fetch {} {} on {} in {}: {}",
                    provider.name(),
                    variable,
                    day,
                    region,
                    e
                );
                return Err(e);
            }
            table_exists = true;
            index.record(&dataset, region, &day_range).await?;
        }
        Ok(())
    }

    /// Loads `product` inside `region` and `range`, ordered by (time, lat, lon).
    ///
    /// With `fetch`, missing days are downloaded and ingested first. Without it
    /// only what is already stored is returned. Corrections are applied to the
    /// result only; stored rows are never changed.
    pub async fn load(
        &self,
        provider: &Arc<dyn Provider>,
        product: &Product,
        region: &BoundingBox,
        range: &TimeRange,
        fetch: bool,
    ) -> Result<PointSeries, GeofetchError> {
        let variables = product
            .variables()
            .into_iter()
            .map(|name| Self::resolve(provider.as_ref(), name))
            .collect::<Result<Vec<_>, _>>()?;

        if fetch {
            for variable in &variables {
                self.fill_gaps(provider, variable, region, range).await?;
            }
        }

        let series = match (product.kind, variables.as_slice()) {
            (ProductKind::Magnitude(..), [u, v]) => {
                self.store
                    .query_magnitude(u.table, v.table, region, range)
                    .await?
            }
            (ProductKind::Corrected(_, correction), [variable]) => {
                correction.apply(self.store.query(variable.table, region, range).await?)
            }
            (_, [variable]) => self.store.query(variable.table, region, range).await?,
            _ => PointSeries::empty(),
        };

        if series.is_empty() {
            info!(
                "No {} {} data in range: {} {}",
                provider.name(),
                product.name,
                region,
                range
            );
        }
        Ok(series)
    }
}
