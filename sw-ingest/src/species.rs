//! Supported species and their reference material

use serde::Serialize;

/// One class the classifier can return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Species {
    pub class: &'static str,
    /// File name under the reference image directory
    pub image: &'static str,
    pub reference_url: &'static str,
}

const fn species(class: &'static str, image: &'static str, reference_url: &'static str) -> Species {
    Species {
        class,
        image,
        reference_url,
    }
}

pub const WHALE_CLASSES: [Species; 26] = [
    species("beluga", "beluga.webp", "https://www.fisheries.noaa.gov/species/beluga-whale"),
    species("blue_whale", "blue-whale.webp", "https://www.fisheries.noaa.gov/species/blue-whale"),
    species(
        "bottlenose_dolphin",
        "bottlenose_dolphin.webp",
        "https://www.fisheries.noaa.gov/species/common-bottlenose-dolphin",
    ),
    species("brydes_whale", "brydes.webp", "https://www.fisheries.noaa.gov/species/brydes-whale"),
    species(
        "commersons_dolphin",
        "common_dolphin.webp",
        "https://en.wikipedia.org/wiki/Commerson's_dolphin",
    ),
    species(
        "common_dolphin",
        "common_dolphin.webp",
        "https://www.fisheries.noaa.gov/species/short-beaked-common-dolphin",
    ),
    species(
        "cuviers_beaked_whale",
        "cuviers_beaked_whale.webp",
        "https://www.fisheries.noaa.gov/species/cuviers-beaked-whale",
    ),
    species("dusky_dolphin", "common_dolphin.webp", "https://en.wikipedia.org/wiki/Dusky_dolphin"),
    species(
        "false_killer_whale",
        "false-killer-whale.webp",
        "https://www.fisheries.noaa.gov/species/false-killer-whale",
    ),
    species("fin_whale", "fin-whale.webp", "https://www.fisheries.noaa.gov/species/fin-whale"),
    species(
        "frasiers_dolphin",
        "fin-whale.webp",
        "https://www.fisheries.noaa.gov/species/frasers-dolphin",
    ),
    species("gray_whale", "gray-whale.webp", "https://www.fisheries.noaa.gov/species/gray-whale"),
    species(
        "humpback_whale",
        "Humpback.webp",
        "https://www.fisheries.noaa.gov/species/humpback-whale",
    ),
    species(
        "killer_whale",
        "killer_whale.webp",
        "https://www.fisheries.noaa.gov/species/killer-whale",
    ),
    species(
        "long_finned_pilot_whale",
        "640x427-long-finned-pilot-whale.webp",
        "https://www.fisheries.noaa.gov/species/long-finned-pilot-whale",
    ),
    species(
        "melon_headed_whale",
        "melon.webp",
        "https://www.fisheries.noaa.gov/species/melon-headed-whale",
    ),
    species("minke_whale", "minke-whale.webp", "https://www.fisheries.noaa.gov/species/minke-whale"),
    species(
        "pantropic_spotted_dolphin",
        "pantropical-spotted-dolphin.webp",
        "https://www.fisheries.noaa.gov/species/pantropical-spotted-dolphin",
    ),
    species(
        "pygmy_killer_whale",
        "pygmy-killer-whale.webp",
        "https://www.fisheries.noaa.gov/species/pygmy-killer-whale",
    ),
    species(
        "rough_toothed_dolphin",
        "rough-toothed-dolphin.webp",
        "https://www.fisheries.noaa.gov/species/rough-toothed-dolphin",
    ),
    species("sei_whale", "sei.webp", "https://www.fisheries.noaa.gov/species/sei-whale"),
    species(
        "short_finned_pilot_whale",
        "Whale_Short-Finned_Pilot-markedDW.png",
        "https://www.fisheries.noaa.gov/species/short-finned-pilot-whale",
    ),
    species(
        "southern_right_whale",
        "640x427-southern-right-whale.jpg",
        "https://www.fisheries.noaa.gov/species/southern-right-whale",
    ),
    species(
        "spinner_dolphin",
        "spinner.webp",
        "https://www.fisheries.noaa.gov/species/spinner-dolphin",
    ),
    species(
        "spotted_dolphin",
        "pantropical-spotted-dolphin.webp",
        "https://www.fisheries.noaa.gov/species/pantropical-spotted-dolphin",
    ),
    species(
        "white_sided_dolphin",
        "640x427-atlantic-white-sided-dolphin.jpg",
        "https://www.fisheries.noaa.gov/species/atlantic-white-sided-dolphin",
    ),
];

pub fn find(class: &str) -> Option<&'static Species> {
    WHALE_CLASSES.iter().find(|s| s.class == class)
}

pub fn is_known(class: &str) -> bool {
    find(class).is_some()
}

/// `long_finned_pilot_whale` -> `Long Finned Pilot Whale`
pub fn format_whale_name(class: &str) -> String {
    let mut out = String::with_capacity(class.len());
    let mut prev_alpha = false;
    for c in class.replace('_', " ").chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}
