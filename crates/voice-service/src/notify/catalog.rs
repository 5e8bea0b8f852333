//! Stub product catalog used by the dummy notification source.

use voice_protocol::ProductRecord;

/// Products and similar-product groups the stub draws from.
///
/// Similar groups are kept separate from the main product list so a
/// "similar" notification never recommends its own main product.
#[derive(Debug, Clone)]
pub struct StubCatalog {
    products: Vec<ProductRecord>,
    similar_groups: Vec<Vec<ProductRecord>>,
}

impl StubCatalog {
    #[must_use]
    pub fn new(products: Vec<ProductRecord>, similar_groups: Vec<Vec<ProductRecord>>) -> Self {
        Self {
            products,
            similar_groups,
        }
    }

    #[must_use]
    pub fn products(&self) -> &[ProductRecord] {
        &self.products
    }

    #[must_use]
    pub fn similar_groups(&self) -> &[Vec<ProductRecord>] {
        &self.similar_groups
    }

    /// The built-in sample catalog: five products, two similar groups.
    #[must_use]
    pub fn sample() -> Self {
        let products = vec![
            ProductRecord::new(
                "1",
                "Samsung Galaxy S24",
                "Samsung",
                899.99,
                "https://example.com/samsung-s24.jpg",
            )
            .with_category("Electronics")
            .with_description("Latest Samsung smartphone with advanced features"),
            ProductRecord::new(
                "2",
                "Nike Air Max 270",
                "Nike",
                150.00,
                "https://example.com/nike-airmax.jpg",
            )
            .with_category("Footwear")
            .with_description("Comfortable running shoes with Air Max technology"),
            ProductRecord::new(
                "3",
                "MacBook Pro M3",
                "Apple",
                1999.99,
                "https://example.com/macbook-pro.jpg",
            )
            .with_category("Electronics")
            .with_description("Professional laptop with M3 chip"),
            ProductRecord::new(
                "4",
                "Levi's 501 Jeans",
                "Levi's",
                69.99,
                "https://example.com/levis-jeans.jpg",
            )
            .with_category("Clothing")
            .with_description("Classic straight-fit jeans"),
            ProductRecord::new(
                "5",
                "Sony WH-1000XM5",
                "Sony",
                399.99,
                "https://example.com/sony-headphones.jpg",
            )
            .with_category("Electronics")
            .with_description("Noise-canceling wireless headphones"),
        ];

        let phones = vec![
            ProductRecord::new(
                "6",
                "iPhone 15 Pro",
                "Apple",
                999.99,
                "https://example.com/iphone-15-pro.jpg",
            )
            .with_description("Latest iPhone with titanium design and advanced camera system"),
            ProductRecord::new(
                "7",
                "Google Pixel 8",
                "Google",
                699.99,
                "https://example.com/pixel-8.jpg",
            )
            .with_description("AI-powered smartphone with exceptional photography capabilities"),
            ProductRecord::new(
                "8",
                "OnePlus 12",
                "OnePlus",
                799.99,
                "https://example.com/oneplus-12.jpg",
            )
            .with_description("Flagship smartphone with fast charging and smooth performance"),
        ];

        let running_shoes = vec![
            ProductRecord::new(
                "9",
                "Adidas Ultraboost",
                "Adidas",
                180.00,
                "https://example.com/adidas-ultraboost.jpg",
            )
            .with_description("High-performance running shoes with responsive cushioning"),
            ProductRecord::new(
                "10",
                "New Balance 990v5",
                "New Balance",
                185.00,
                "https://example.com/nb-990v5.jpg",
            )
            .with_description("Premium lifestyle sneakers with classic design and comfort"),
            ProductRecord::new(
                "11",
                "ASICS Gel-Kayano",
                "ASICS",
                160.00,
                "https://example.com/asics-gel-kayano.jpg",
            )
            .with_description("Stability running shoes with gel cushioning technology"),
        ];

        Self::new(products, vec![phones, running_shoes])
    }
}

impl Default for StubCatalog {
    fn default() -> Self {
        Self::sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_sample_catalog_shape() {
        let catalog = StubCatalog::sample();
        assert_eq!(catalog.products().len(), 5);
        assert_eq!(catalog.similar_groups().len(), 2);
        assert!(catalog.similar_groups().iter().all(|g| g.len() == 3));
    }

    #[test]
    fn test_sample_ids_are_unique() {
        let catalog = StubCatalog::sample();
        let ids: Vec<&str> = catalog
            .products()
            .iter()
            .chain(catalog.similar_groups().iter().flatten())
            .map(|p| p.id.as_str())
            .collect();
        let unique: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());
    }
}
