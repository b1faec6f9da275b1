use std::fmt::{self, Display};

use anyhow::Result;
use itertools::Itertools;
use shoppo_catalog::Product;
use shoppo_sdk::models::favorites::FavoritesStore;
use shoppo_sdk::models::preferences::FavoritesLayout;

const FAVORITE_MARKER: &str = "★";
const GRID_COLUMNS: usize = 3;
const GRID_CELL_WIDTH: usize = 26;

/// Numbered product rows, numbering starts after `offset`.
pub(crate) struct DisplayProducts<'a> {
    products: &'a [Product],
    offset: usize,
    favorites: &'a FavoritesStore,
}

impl<'a> DisplayProducts<'a> {
    pub(crate) fn new(
        products: &'a [Product],
        offset: usize,
        favorites: &'a FavoritesStore,
    ) -> Self {
        Self {
            products,
            offset,
            favorites,
        }
    }
}

impl Display for DisplayProducts<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, product) in self.products.iter().enumerate() {
            let marker = if self.favorites.is_favorite(&product.id()) {
                format!(" {FAVORITE_MARKER}")
            } else {
                String::new()
            };
            writeln!(f, "{:>3}. {}{marker}", self.offset + n + 1, product.name)?;
            writeln!(
                f,
                "     {}  {} ({})",
                price_label(product),
                product.vendor_name,
                product.id()
            )?;
        }
        Ok(())
    }
}

/// Products as a grid of names and prices.
pub(crate) struct DisplayGrid<'a> {
    products: &'a [Product],
}

impl<'a> DisplayGrid<'a> {
    pub(crate) fn new(products: &'a [Product]) -> Self {
        Self { products }
    }
}

impl Display for DisplayGrid<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.products.iter().chunks(GRID_COLUMNS) {
            let row = row.collect::<Vec<_>>();
            let names = row
                .iter()
                .map(|product| {
                    let name = truncate(&product.name, GRID_CELL_WIDTH - 2);
                    format!("{name:<GRID_CELL_WIDTH$}")
                })
                .join("");
            let prices = row
                .iter()
                .map(|product| {
                    let price = truncate(&price_label(product), GRID_CELL_WIDTH - 2);
                    format!("{price:<GRID_CELL_WIDTH$}")
                })
                .join("");
            writeln!(f, "{}", names.trim_end())?;
            writeln!(f, "{}", prices.trim_end())?;
        }
        Ok(())
    }
}

/// Render favorites in the preferred layout.
pub(crate) fn render_favorites(
    products: &[Product],
    layout: FavoritesLayout,
    favorites: &FavoritesStore,
) -> String {
    match layout {
        FavoritesLayout::List => DisplayProducts::new(products, 0, favorites).to_string(),
        FavoritesLayout::Grid => DisplayGrid::new(products).to_string(),
    }
}

pub(crate) fn render_json(products: &[Product]) -> Result<String> {
    Ok(serde_json::to_string_pretty(products)?)
}

fn price_label(product: &Product) -> String {
    if product.is_on_sale() {
        format!("{} (was {})", product.sale_price, product.price)
    } else {
        product.price.clone()
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut truncated = s.chars().take(width.saturating_sub(1)).collect::<String>();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use shoppo_catalog::ProductId;

    use super::*;

    fn product(
        vendor_id: &str,
        product_id: &str,
        name: &str,
        price: &str,
        sale_price: &str,
    ) -> Product {
        Product {
            name: name.to_string(),
            price: price.to_string(),
            sale_price: sale_price.to_string(),
            image: String::new(),
            url: String::new(),
            product_id: product_id.to_string(),
            vendor_id: vendor_id.to_string(),
            vendor_name: "Run Shop".to_string(),
            summary: String::new(),
        }
    }

    #[test]
    fn rows_are_numbered_and_mark_favorites() {
        let products = [
            product("42", "1", "Trail Runner", "$120.00", ""),
            product("42", "2", "Road Runner", "$150.00", "$99.00"),
        ];
        let mut favorites = FavoritesStore::new();
        favorites.toggle_favorite(&ProductId::from("42.2"));

        let rendered = DisplayProducts::new(&products, 24, &favorites).to_string();

        assert_eq!(
            rendered,
            concat!(
                " 25. Trail Runner\n",
                "     $120.00  Run Shop (42.1)\n",
                " 26. Road Runner ★\n",
                "     $99.00 (was $150.00)  Run Shop (42.2)\n",
            )
        );
    }

    #[test]
    fn grid_wraps_rows() {
        let products = [
            product("1", "1", "One", "$1", ""),
            product("1", "2", "Two", "$2", ""),
            product("1", "3", "Three", "$3", ""),
            product("1", "4", "A product name that is far too long", "$4", ""),
        ];

        let rendered = DisplayGrid::new(&products).to_string();
        let lines = rendered.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("One"));
        assert!(lines[0].contains("Three"));
        assert_eq!(lines[2], "A product name that is …");
        assert_eq!(lines[3], "$4");
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate("Ōtautahi Market", 5), "Ōtau…");
        assert_eq!(truncate("short", 10), "short");
    }
}
