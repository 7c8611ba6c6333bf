//! Catalog and review crawl jobs.
//!
//! Both jobs start from a resolved [`ProductIndex`]. The catalog job fetches
//! one detail payload per product; the review job fetches every comment page
//! per product. Endpoints travel with the job so the same code serves any
//! deployment of the upstream API.

use std::collections::BTreeMap;

use bazaar_core::{PipelineConfig, ProductId};
use serde_json::Value;
use tracing::info;

use crate::api::{CommentPage, Envelope, ProductDetail};
use crate::client::{FetchClient, FetchError};
use crate::discovery::ProductIndex;
use crate::fanout::{collect, FanoutSettings};
use crate::types::{CrawlStats, Parent};

/// Endpoints of the product catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogJob {
    /// Brand-filtered listing; also serves the brand options.
    pub catalog_url: String,
    /// Category listing base. When set, parents are categories, not brands.
    pub category_url: Option<String>,
    /// Product detail base; `<base><id>/`.
    pub product_url: String,
    pub in_stock_only: bool,
}

impl CatalogJob {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            catalog_url: config.catalog_url.clone(),
            category_url: config.category_url.clone(),
            product_url: config.product_url.clone(),
            in_stock_only: config.in_stock_only,
        }
    }

    /// Listing page URL of a brand or category; `None` for a category when no
    /// category listing is configured.
    pub fn listing_url(&self, parent: &Parent, page: u32) -> Option<String> {
        match parent {
            Parent::Brand(id) => {
                let stock = if self.in_stock_only {
                    "has_selling_stock=1&"
                } else {
                    ""
                };
                Some(format!(
                    "{}?{}brand[0]={}&page={}",
                    self.catalog_url, stock, id, page
                ))
            }
            Parent::Category(code) => {
                let base = self.category_url.as_deref()?;
                Some(format!(
                    "{}/categories/{}/search/?page={}",
                    base.trim_end_matches('/'),
                    code,
                    page
                ))
            }
        }
    }

    pub fn product_url(&self, id: &ProductId) -> String {
        format!("{}{}/", self.product_url, id)
    }

    /// Fetch the detail payload of every indexed product, grouped under the
    /// first parent that lists it.
    pub async fn collect(
        &self,
        client: &FetchClient,
        settings: FanoutSettings,
        index: &ProductIndex,
    ) -> Harvest {
        let assignments = index.assignments();
        let requested = assignments.len();

        let details = {
            let client = client.clone();
            let job = self.clone();
            collect("product detail", assignments, settings, move |(parent, id): (String, ProductId)| {
                let client = client.clone();
                let url = job.product_url(&id);
                async move {
                    let env: Envelope<ProductDetail> = client.fetch(&url).await?;
                    Ok::<_, FetchError>((parent, env.data.product))
                }
            })
            .await
        };

        let mut records: BTreeMap<String, Vec<Value>> =
            index.0.keys().map(|k| (k.clone(), Vec::new())).collect();
        let stats = details.stats();
        for (parent, product) in details.items {
            records.entry(parent).or_default().push(product);
        }

        info!(
            "Catalog crawl: {} of {} products fetched ({} failed, {} abandoned)",
            stats.succeeded, requested, stats.failed, stats.abandoned
        );
        Harvest { records, stats }
    }
}

/// Endpoint of the per-product review listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewJob {
    /// `<base><id>/?page=<n>`.
    pub comments_url: String,
}

impl ReviewJob {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            comments_url: config.comments_url.clone(),
        }
    }

    pub fn page_url(&self, id: &ProductId, page: u32) -> String {
        format!("{}{}/?page={}", self.comments_url, id, page)
    }

    /// Fetch every comment page of every indexed product.
    ///
    /// Page 1 is fetched first for all products; it carries both comments
    /// and the page count. Pages `2..=total_pages` are then fanned out.
    pub async fn collect(
        &self,
        client: &FetchClient,
        settings: FanoutSettings,
        index: &ProductIndex,
    ) -> Harvest {
        let ids: Vec<ProductId> = index.all_ids().into_iter().collect();
        let mut stats = CrawlStats::default();

        let first_pages = {
            let client = client.clone();
            let job = self.clone();
            collect("comments page 1", ids, settings, move |id: ProductId| {
                let client = client.clone();
                let url = job.page_url(&id, 1);
                async move {
                    let env: Envelope<CommentPage> = client.fetch(&url).await?;
                    Ok::<_, FetchError>((id, env.data))
                }
            })
            .await
        };
        stats.merge(first_pages.stats());

        let mut records: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        let mut rest = Vec::new();
        for (id, page) in first_pages.items {
            let total_pages = page.pager.map(|p| p.total_pages).unwrap_or(1);
            rest.extend((2..=total_pages).map(|n| (id.clone(), n)));
            records.insert(id.into_string(), page.comments);
        }

        let later_pages = {
            let client = client.clone();
            let job = self.clone();
            collect("comments", rest, settings, move |(id, page): (ProductId, u32)| {
                let client = client.clone();
                let url = job.page_url(&id, page);
                async move {
                    let env: Envelope<CommentPage> = client.fetch(&url).await?;
                    Ok::<_, FetchError>((id, env.data.comments))
                }
            })
            .await
        };
        stats.merge(later_pages.stats());

        for (id, comments) in later_pages.items {
            records.entry(id.into_string()).or_default().extend(comments);
        }

        let total: usize = records.values().map(Vec::len).sum();
        info!(
            "Review crawl: {} comments for {} products ({} failed, {} abandoned requests)",
            total,
            records.len(),
            stats.failed,
            stats.abandoned
        );
        Harvest { records, stats }
    }
}

/// Raw payloads of one stream keyed by parent (catalog) or product (reviews).
#[derive(Debug, Clone, Default)]
pub struct Harvest {
    pub records: BTreeMap<String, Vec<Value>>,
    pub stats: CrawlStats,
}

impl Harvest {
    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }
}

/// A crawl stream with its endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlJob {
    Catalog(CatalogJob),
    Review(ReviewJob),
}

impl CrawlJob {
    pub fn name(&self) -> &'static str {
        match self {
            CrawlJob::Catalog(_) => "catalog",
            CrawlJob::Review(_) => "reviews",
        }
    }

    pub async fn collect(
        &self,
        client: &FetchClient,
        settings: FanoutSettings,
        index: &ProductIndex,
    ) -> Harvest {
        match self {
            CrawlJob::Catalog(job) => job.collect(client, settings, index).await,
            CrawlJob::Review(job) => job.collect(client, settings, index).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> CatalogJob {
        CatalogJob {
            catalog_url: "http://api/v1/categories/mobile-phone/search/".into(),
            category_url: None,
            product_url: "http://api/v2/product/".into(),
            in_stock_only: true,
        }
    }

    #[test]
    fn test_brand_listing_url() {
        let url = catalog().listing_url(&Parent::Brand(18), 3).unwrap();
        assert_eq!(
            url,
            "http://api/v1/categories/mobile-phone/search/?has_selling_stock=1&brand[0]=18&page=3"
        );

        let mut all = catalog();
        all.in_stock_only = false;
        assert!(!all
            .listing_url(&Parent::Brand(18), 1)
            .unwrap()
            .contains("has_selling_stock"));
    }

    #[test]
    fn test_category_listing_url_needs_base() {
        let job = catalog();
        assert!(job
            .listing_url(&Parent::Category("dairy".into()), 1)
            .is_none());

        let job = CatalogJob {
            category_url: Some("http://fresh/v1/".into()),
            ..catalog()
        };
        assert_eq!(
            job.listing_url(&Parent::Category("dairy".into()), 2).unwrap(),
            "http://fresh/v1/categories/dairy/search/?page=2"
        );
    }

    #[test]
    fn test_detail_and_comment_urls() {
        let id = ProductId::from(42);
        assert_eq!(catalog().product_url(&id), "http://api/v2/product/42/");
        let reviews = ReviewJob {
            comments_url: "http://api/v1/rate-review/products/".into(),
        };
        assert_eq!(
            reviews.page_url(&id, 2),
            "http://api/v1/rate-review/products/42/?page=2"
        );
        assert_eq!(CrawlJob::Review(reviews).name(), "reviews");
    }
}
