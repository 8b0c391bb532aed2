//! Seed the catalog from a YAML file.
//!
//! The file is a list of products in the same shape the API returns:
//!
//! ```yaml
//! - name: 캠핑 텐트
//!   price: 129000
//!   category: 캠핑
//!   imageUrl: /images/tent.png
//! - name: 머그컵
//!   price: 8000
//! ```

use std::path::Path;

use tracing::{error, info};

use ai_store_server::config::ServerConfig;
use ai_store_server::db::{self, Migrator, ProductRepository, products::NewProduct};

/// Parse a product list, rejecting blank names and negative prices.
///
/// # Errors
///
/// Returns an error if the YAML is malformed or any entry is invalid.
pub fn parse_products(content: &str) -> Result<Vec<NewProduct>, Box<dyn std::error::Error>> {
    let products: Vec<NewProduct> = serde_yaml::from_str(content)?;

    let errors: Vec<String> = products
        .iter()
        .enumerate()
        .filter_map(|(index, product)| {
            if product.name.trim().is_empty() {
                Some(format!("entry {index}: name is empty"))
            } else if product.price < 0 {
                Some(format!("entry {index} ({}): negative price", product.name))
            } else {
                None
            }
        })
        .collect();

    if !errors.is_empty() {
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    Ok(products)
}

/// Insert every product from `path` into the catalog.
///
/// # Errors
///
/// Returns an error if the file cannot be read or validated, or the
/// `products` table is unusable.
pub async fn products(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("File not found: {}", path.display()).into());
    }

    info!(path = %path.display(), "Loading products from file");

    // Validate before connecting to the database
    let content = tokio::fs::read_to_string(path).await?;
    let products = parse_products(&content)?;
    info!(count = products.len(), "Parsed product list");

    let config = ServerConfig::from_env()?;
    let pool = db::create_pool(&config.database_url).await?;
    Migrator::default().run(&pool).await.ensure_ready("products")?;

    let inserted = insert_all(&ProductRepository::new(&pool), &products).await?;
    pool.close().await;

    info!(inserted, "Seeding complete!");
    Ok(())
}

async fn insert_all(
    repo: &ProductRepository<'_>,
    products: &[NewProduct],
) -> Result<usize, Box<dyn std::error::Error>> {
    for product in products {
        let created = repo.create(product).await?;
        info!(id = %created.id, name = %created.name, "Inserted product");
    }
    Ok(products.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CATALOG: &str = "
- name: Tent
  price: 129000
  category: camping
  imageUrl: /images/tent.png
- name: Mug
  price: 8000
";

    #[test]
    fn test_parse_products() {
        let products = parse_products(CATALOG).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].image_url.as_deref(), Some("/images/tent.png"));
        assert_eq!(products[1].category, None);
    }

    #[test]
    fn test_parse_rejects_invalid_entries() {
        assert!(parse_products("- name: ''\n  price: 1\n").is_err());
        assert!(parse_products("- name: Lamp\n  price: -5\n").is_err());
        assert!(parse_products("not: a list").is_err());
    }

    #[tokio::test]
    async fn test_insert_all() {
        let pool = db::connect_in_memory().await.unwrap();
        Migrator::default().run(&pool).await;

        let repo = ProductRepository::new(&pool);
        let inserted = insert_all(&repo, &parse_products(CATALOG).unwrap())
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(repo.list(Some("tent")).await.unwrap().len(), 1);
    }
}
