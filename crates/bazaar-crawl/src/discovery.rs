//! Discovery: which brands or categories exist, how many listing pages each
//! has, and which product ids those pages list.

use std::collections::{BTreeMap, BTreeSet};

use bazaar_core::ProductId;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{BrandListing, CategoryListing, Envelope, ListingPage};
use crate::client::{FetchClient, FetchError};
use crate::fanout::{collect, FanoutSettings};
use crate::jobs::CatalogJob;
use crate::types::{Brand, Category, CrawlStats, Parent, WorkUnit};

/// Parent key → product ids listed under it. Parents whose listing was
/// empty or unreachable are present with an empty set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductIndex(pub BTreeMap<String, BTreeSet<ProductId>>);

impl ProductIndex {
    pub fn parent_count(&self) -> usize {
        self.0.len()
    }

    /// Distinct products across all parents.
    pub fn all_ids(&self) -> BTreeSet<ProductId> {
        self.0.values().flatten().cloned().collect()
    }

    pub fn product_count(&self) -> usize {
        self.all_ids().len()
    }

    /// Each distinct product paired with the first parent (by key order)
    /// that lists it.
    pub fn assignments(&self) -> Vec<(String, ProductId)> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for (parent, ids) in &self.0 {
            for id in ids {
                if seen.insert(id.clone()) {
                    out.push((parent.clone(), id.clone()));
                }
            }
        }
        out
    }
}

/// Resolves the work universe for one catalog job.
pub struct Resolver {
    client: FetchClient,
    job: CatalogJob,
    settings: FanoutSettings,
}

impl Resolver {
    pub fn new(client: FetchClient, job: CatalogJob, settings: FanoutSettings) -> Self {
        Self {
            client,
            job,
            settings,
        }
    }

    /// Brand options of the catalog listing. Empty on failure.
    pub async fn list_brands(&self) -> Vec<Brand> {
        match self
            .client
            .fetch::<Envelope<BrandListing>>(&self.job.catalog_url)
            .await
        {
            Ok(env) => {
                let brands = env.data.filters.brands.options;
                info!("Discovered {} brands", brands.len());
                brands
            }
            Err(e) => {
                warn!("Brand listing unavailable: {}", e);
                Vec::new()
            }
        }
    }

    /// Category codes of the category listing. Empty on failure or when no
    /// category listing is configured.
    pub async fn list_categories(&self) -> Vec<Category> {
        let Some(url) = &self.job.category_url else {
            return Vec::new();
        };
        match self.client.fetch::<Envelope<CategoryListing>>(url).await {
            Ok(env) => {
                let categories = env.data.categories();
                info!("Discovered {} categories", categories.len());
                categories
            }
            Err(e) => {
                warn!("Category listing unavailable: {}", e);
                Vec::new()
            }
        }
    }

    /// Listing parents for this job: categories when a category listing is
    /// configured, brands otherwise.
    pub async fn list_parents(&self) -> Vec<Parent> {
        if self.job.category_url.is_some() {
            self.list_categories()
                .await
                .into_iter()
                .map(|c| Parent::Category(c.code))
                .collect()
        } else {
            self.list_brands()
                .await
                .into_iter()
                .map(|b| Parent::Brand(b.id))
                .collect()
        }
    }

    /// Page count of a parent's listing; 0 when the probe fails.
    pub async fn probe_total_pages(&self, parent: &Parent) -> u32 {
        match first_page(&self.client, &self.job, parent).await {
            Ok((total_pages, _)) => total_pages,
            Err(e) => {
                warn!("Probe for {} failed: {}", parent, e);
                0
            }
        }
    }

    /// Fetch page 1 of every parent, then fan out over the remaining pages.
    ///
    /// Page 1 yields both the page count and its own product ids, so it is
    /// never requested twice.
    pub async fn resolve_product_ids(&self, parents: Vec<Parent>) -> (ProductIndex, CrawlStats) {
        let mut stats = CrawlStats::default();
        let mut index = ProductIndex::default();
        for parent in &parents {
            index.0.entry(parent.key()).or_default();
        }

        let first_pages = {
            let client = self.client.clone();
            let job = self.job.clone();
            collect("probe", parents, self.settings, move |parent: Parent| {
                let client = client.clone();
                let job = job.clone();
                async move {
                    let (total_pages, ids) = first_page(&client, &job, &parent).await?;
                    Ok::<_, FetchError>((parent, total_pages, ids))
                }
            })
            .await
        };
        stats.merge(first_pages.stats());

        let mut units = Vec::new();
        for (parent, total_pages, ids) in first_pages.items {
            if total_pages == 0 {
                info!("{} has no listing pages", parent);
            }
            index.0.entry(parent.key()).or_default().extend(ids);
            units.extend(remaining_pages(&parent, total_pages));
        }

        let pages = {
            let client = self.client.clone();
            let job = self.job.clone();
            collect("listing", units, self.settings, move |unit: WorkUnit| {
                let client = client.clone();
                let url = job.listing_url(&unit.parent, unit.page);
                async move {
                    let url = url.ok_or_else(|| {
                        FetchError::Request(format!("no listing for {}", unit.parent))
                    })?;
                    let env: Envelope<ListingPage> = client.fetch(&url).await?;
                    Ok::<_, FetchError>((unit.parent.key(), env.data.product_ids()))
                }
            })
            .await
        };
        stats.merge(pages.stats());

        for (key, ids) in pages.items {
            index.0.entry(key).or_default().extend(ids);
        }

        info!(
            "Resolved {} products across {} parents",
            index.product_count(),
            index.parent_count()
        );
        (index, stats)
    }
}

/// Page count and product ids from page 1 of a parent's listing.
async fn first_page(
    client: &FetchClient,
    job: &CatalogJob,
    parent: &Parent,
) -> Result<(u32, Vec<ProductId>), FetchError> {
    let url = job
        .listing_url(parent, 1)
        .ok_or_else(|| FetchError::Request(format!("no listing for {}", parent)))?;
    let env: Envelope<ListingPage> = client.fetch(&url).await?;
    Ok((env.data.pager.total_pages, env.data.product_ids()))
}

/// Pages `2..=total_pages` of `parent`; page 1 comes from the probe.
pub fn remaining_pages(parent: &Parent, total_pages: u32) -> Vec<WorkUnit> {
    (2..=total_pages)
        .map(|page| WorkUnit {
            parent: parent.clone(),
            page,
        })
        .collect()
}
