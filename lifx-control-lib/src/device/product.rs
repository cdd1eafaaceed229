use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::Serialize;

const NONE: u16 = 0;
const COLOR: u16 = 1 << 0;
const INFRARED: u16 = 1 << 1;
const MULTIZONE: u16 = 1 << 2;
const EXTENDED_MULTIZONE: u16 = 1 << 3;
const MATRIX: u16 = 1 << 4;
const CHAIN: u16 = 1 << 5;
const HEV: u16 = 1 << 6;
const BUTTONS: u16 = 1 << 7;
const RELAYS: u16 = 1 << 8;

/// Candle family, a single row of eight zones.
const SINGLE_ROW_MATRIX: &[u32] = &[57, 68, 100, 137, 138];

// (product id, name, features, kelvin range) for LIFX vendor 1
const PRODUCT_ROWS: &[(u32, &str, u16, Option<(u16, u16)>)] = &[
    (1, "LIFX Original 1000", COLOR, Some((2500, 9000))),
    (3, "LIFX Color 650", COLOR, Some((2500, 9000))),
    (10, "LIFX White 800 (Low Voltage)", NONE, Some((2700, 6500))),
    (11, "LIFX White 800 (High Voltage)", NONE, Some((2700, 6500))),
    (15, "LIFX Color 1000", COLOR, Some((2500, 9000))),
    (18, "LIFX White 900 BR30 (Low Voltage)", NONE, Some((2500, 9000))),
    (19, "LIFX White 900 BR30 (High Voltage)", NONE, Some((2500, 9000))),
    (20, "LIFX Color 1000 BR30", COLOR, Some((2500, 9000))),
    (22, "LIFX Color 1000", COLOR, Some((2500, 9000))),
    (27, "LIFX A19", COLOR, Some((2500, 9000))),
    (28, "LIFX BR30", COLOR, Some((2500, 9000))),
    (29, "LIFX A19 Night Vision", COLOR | INFRARED, Some((2500, 9000))),
    (30, "LIFX BR30 Night Vision", COLOR | INFRARED, Some((2500, 9000))),
    (31, "LIFX Z", COLOR | MULTIZONE, Some((2500, 9000))),
    (32, "LIFX Z", COLOR | MULTIZONE, Some((2500, 9000))),
    (36, "LIFX Downlight", COLOR, Some((2500, 9000))),
    (37, "LIFX Downlight", COLOR, Some((2500, 9000))),
    (38, "LIFX Beam", COLOR | MULTIZONE, Some((2500, 9000))),
    (39, "LIFX Downlight White to Warm", NONE, Some((2500, 9000))),
    (40, "LIFX Downlight", COLOR, Some((2500, 9000))),
    (43, "LIFX A19", COLOR, Some((2500, 9000))),
    (44, "LIFX BR30", COLOR, Some((2500, 9000))),
    (45, "LIFX A19 Night Vision", COLOR | INFRARED, Some((2500, 9000))),
    (46, "LIFX BR30 Night Vision", COLOR | INFRARED, Some((2500, 9000))),
    (49, "LIFX Mini Color", COLOR, Some((2500, 9000))),
    (50, "LIFX Mini White to Warm", NONE, Some((1500, 9000))),
    (51, "LIFX Mini White", NONE, Some((2700, 2700))),
    (52, "LIFX GU10", COLOR, Some((2500, 9000))),
    (53, "LIFX GU10", COLOR, Some((2500, 9000))),
    (55, "LIFX Tile", COLOR | MATRIX | CHAIN, Some((2500, 9000))),
    (57, "LIFX Candle", COLOR | MATRIX, Some((2500, 9000))),
    (59, "LIFX Mini Color", COLOR, Some((2500, 9000))),
    (60, "LIFX Mini White to Warm", NONE, Some((1500, 9000))),
    (61, "LIFX Mini White", NONE, Some((2700, 2700))),
    (62, "LIFX A19", COLOR, Some((2500, 9000))),
    (63, "LIFX BR30", COLOR, Some((2500, 9000))),
    (64, "LIFX A19 Night Vision", COLOR | INFRARED, Some((2500, 9000))),
    (65, "LIFX BR30 Night Vision", COLOR | INFRARED, Some((2500, 9000))),
    (66, "LIFX Mini White", NONE, Some((2700, 2700))),
    (68, "LIFX Candle", COLOR | MATRIX, Some((2500, 9000))),
    (70, "LIFX Switch", BUTTONS | RELAYS, None),
    (71, "LIFX Switch", BUTTONS | RELAYS, None),
    (81, "LIFX Candle White to Warm", NONE, Some((2500, 6500))),
    (82, "LIFX Filament Clear", NONE, Some((2100, 2100))),
    (85, "LIFX Filament Amber", NONE, Some((2000, 2000))),
    (87, "LIFX Mini White", NONE, Some((2700, 2700))),
    (88, "LIFX Mini White", NONE, Some((2700, 2700))),
    (89, "LIFX Switch", BUTTONS | RELAYS, None),
    (90, "LIFX Clean", COLOR | HEV, Some((2500, 9000))),
    (91, "LIFX Color", COLOR, Some((2500, 9000))),
    (92, "LIFX Color", COLOR, Some((2500, 9000))),
    (93, "LIFX A19 Night Vision Intl", COLOR | INFRARED, Some((2500, 9000))),
    (94, "LIFX BR30 Night Vision Intl", COLOR | INFRARED, Some((2500, 9000))),
    (96, "LIFX A19 Night Vision", COLOR | INFRARED, Some((2500, 9000))),
    (97, "LIFX BR30 Night Vision", COLOR | INFRARED, Some((2500, 9000))),
    (98, "LIFX Mini White to Warm", NONE, Some((1500, 9000))),
    (99, "LIFX Mini White to Warm", NONE, Some((1500, 9000))),
    (100, "LIFX Candle Color", COLOR | MATRIX, Some((1500, 9000))),
    (101, "LIFX A19 Night Vision", COLOR | INFRARED, Some((2500, 9000))),
    (102, "LIFX BR30 Night Vision", COLOR | INFRARED, Some((2500, 9000))),
    (109, "LIFX A19 Night Vision", COLOR | INFRARED, Some((2500, 9000))),
    (110, "LIFX BR30 Night Vision", COLOR | INFRARED, Some((2500, 9000))),
    (111, "LIFX A19 Night Vision", COLOR | INFRARED, Some((2500, 9000))),
    (112, "LIFX BR30 Night Vision Intl", COLOR | INFRARED, Some((2500, 9000))),
    (113, "LIFX Mini White to Warm", NONE, Some((1500, 9000))),
    (114, "LIFX Mini White to Warm", NONE, Some((1500, 9000))),
    (115, "LIFX String", COLOR | MULTIZONE | EXTENDED_MULTIZONE, Some((1500, 9000))),
    (116, "LIFX String", COLOR | MULTIZONE | EXTENDED_MULTIZONE, Some((1500, 9000))),
    (117, "LIFX String", COLOR | MULTIZONE | EXTENDED_MULTIZONE, Some((1500, 9000))),
    (118, "LIFX String", COLOR | MULTIZONE | EXTENDED_MULTIZONE, Some((1500, 9000))),
    (119, "LIFX Neon", COLOR | MULTIZONE | EXTENDED_MULTIZONE, Some((1500, 9000))),
    (120, "LIFX Neon", COLOR | MULTIZONE | EXTENDED_MULTIZONE, Some((1500, 9000))),
    (137, "LIFX Candle Color US", COLOR | MATRIX, Some((1500, 9000))),
    (138, "LIFX Candle Colour Intl", COLOR | MATRIX, Some((1500, 9000))),
    (171, "LIFX Round Spot US", COLOR | MATRIX, Some((1500, 9000))),
    (173, "LIFX Round Path US", COLOR | MATRIX, Some((1500, 9000))),
    (174, "LIFX Square Path US", COLOR | MATRIX, Some((1500, 9000))),
    (176, "LIFX Ceiling US", COLOR | MATRIX, Some((1500, 9000))),
    (177, "LIFX Ceiling Intl", COLOR | MATRIX, Some((1500, 9000))),
    (201, "LIFX Ceiling 13x26\" US", COLOR | MATRIX, Some((1500, 9000))),
    (202, "LIFX Ceiling 13x26\" Intl", COLOR | MATRIX, Some((1500, 9000))),
    (217, "LIFX Tube US", COLOR | MATRIX, Some((1500, 9000))),
    (218, "LIFX Tube Intl", COLOR | MATRIX, Some((1500, 9000))),
    (219, "LIFX Luna US", COLOR | MATRIX | BUTTONS, Some((1500, 9000))),
    (220, "LIFX Luna Intl", COLOR | MATRIX | BUTTONS, Some((1500, 9000))),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Features {
    pub color: bool,
    pub infrared: bool,
    pub multizone: bool,
    pub extended_multizone: bool,
    pub matrix: bool,
    pub chain: bool,
    pub hev: bool,
    pub buttons: bool,
    pub relays: bool,
    pub temperature_range: Option<(u16, u16)>,
}

impl Features {
    fn from_bits(bits: u16, temperature_range: Option<(u16, u16)>) -> Self {
        Features {
            color: bits & COLOR != 0,
            infrared: bits & INFRARED != 0,
            multizone: bits & MULTIZONE != 0,
            extended_multizone: bits & EXTENDED_MULTIZONE != 0,
            matrix: bits & MATRIX != 0,
            chain: bits & CHAIN != 0,
            hev: bits & HEV != 0,
            buttons: bits & BUTTONS != 0,
            relays: bits & RELAYS != 0,
            temperature_range,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: u32,
    pub name: String,
    pub features: Features,
}

impl Product {
    /// Stand-in for ids missing from the table. Assumes a plain color bulb.
    pub fn unknown(id: u32) -> Self {
        Product {
            id,
            name: format!("Unknown product ({})", id),
            features: Features::from_bits(COLOR, Some((2500, 9000))),
        }
    }

    /// Pixel grid (width, height) for matrix products.
    pub fn matrix_size(&self) -> Option<(usize, usize)> {
        if !self.features.matrix {
            return None;
        }
        if SINGLE_ROW_MATRIX.contains(&self.id) {
            Some((8, 1))
        } else {
            Some((8, 8))
        }
    }
}

lazy_static! {
    static ref PRODUCTS: HashMap<u32, Product> = PRODUCT_ROWS
        .iter()
        .map(|&(id, name, bits, range)| {
            (
                id,
                Product {
                    id,
                    name: name.to_string(),
                    features: Features::from_bits(bits, range),
                },
            )
        })
        .collect();
}

/// Looks up a product id. Unknown ids get a generic placeholder so the
/// device stays fully controllable.
pub fn lookup(id: u32) -> Product {
    PRODUCTS.get(&id).cloned().unwrap_or_else(|| Product::unknown(id))
}

/// True when the id is in the table.
pub fn is_known(id: u32) -> bool {
    PRODUCTS.contains_key(&id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_products() {
        let tile = lookup(55);
        assert_eq!(tile.name, "LIFX Tile");
        assert!(tile.features.matrix);
        assert!(tile.features.chain);
        assert_eq!(tile.matrix_size(), Some((8, 8)));

        let candle = lookup(57);
        assert_eq!(candle.matrix_size(), Some((8, 1)));

        let string = lookup(115);
        assert!(string.features.multizone);
        assert!(string.features.extended_multizone);

        let night_vision = lookup(29);
        assert!(night_vision.features.infrared);
        assert_eq!(night_vision.matrix_size(), None);
    }

    #[test]
    fn test_unknown_product_is_tolerated() {
        assert!(!is_known(9999));
        let product = lookup(9999);
        assert_eq!(product.name, "Unknown product (9999)");
        assert!(product.features.color);
        assert!(!product.features.matrix);
    }

    #[test]
    fn test_table_has_every_row() {
        assert_eq!(PRODUCTS.len(), PRODUCT_ROWS.len());
        assert!(PRODUCTS.values().all(|p| !p.name.is_empty()));
    }
}
