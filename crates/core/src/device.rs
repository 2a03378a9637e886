//! Camera make/model clean-up into one display string.

/// Corporate make strings mapped to a short brand. Matched as case-insensitive substrings,
/// first hit wins, so longer names must precede their prefixes.
const CORPORATE_NAMES: &[(&str, &str)] = &[
    ("HEWLETT-PACKARD", "HP"),
    ("KONICA MINOLTA CAMERA, INC.", "Konica Minolta"),
    ("KONICA MINOLTA", "Konica Minolta"),
    ("LG ELECTRONICS", "LG"),
    ("MINOLTA CO., LTD.", "Minolta"),
    ("NIKON CORPORATION", "Nikon"),
    ("CASIO COMPUTER CO.,LTD", "Casio"),
    ("EASTMAN KODAK COMPANY", "Kodak"),
    ("OLYMPUS CORPORATION", "Olympus"),
    ("OLYMPUS IMAGING CORP.", "Olympus"),
    ("OLYMPUS OPTICAL CO.,LTD", "Olympus"),
    ("SAMSUNG TECHWIN CO., LTD.", "Samsung"),
    ("SAMSUNG ELECTRONICS", "Samsung"),
    ("SAMSUNG TECHWIN", "Samsung"),
    ("SONY ERICSSON MOBILE COMMUNICATIONS AB", "Sony Ericsson"),
    ("SONY MOBILE COMMUNICATIONS", "Sony"),
    ("SONY INTERACTIVE ENTERTAINMENT", "Sony"),
    ("SONY CORPORATION", "Sony"),
    ("PENTAX CORPORATION", "Pentax"),
];

/// Legal-entity suffixes dropped from makes that are not in the corporate table.
const CORPORATE_SUFFIXES: &[&str] = &[
    " ELECTRIC CO.,LTD.",
    " ELECTRIC CO.,LTD",
    " TECHWIN CO.,LTD.",
    " IMAGING CORP.",
    " CORPORATION",
    " CO.,LTD.",
];

/// All-caps makes and their usual spelling.
const MAKERS: &[(&str, &str)] = &[
    ("CANON", "Canon"),
    ("NIKON", "Nikon"),
    ("SONY", "Sony"),
    ("FUJIFILM", "Fujifilm"),
    ("PANASONIC", "Panasonic"),
    ("OLYMPUS", "Olympus"),
    ("OM SYSTEM", "OM System"),
    ("LEICA", "Leica"),
    ("PENTAX", "Pentax"),
    ("RICOH", "Ricoh"),
    ("KODAK", "Kodak"),
    ("CASIO", "Casio"),
    ("SAMSUNG", "Samsung"),
    ("SIGMA", "Sigma"),
    ("HASSELBLAD", "Hasselblad"),
    ("GOPRO", "GoPro"),
    ("DJI", "DJI"),
    ("PHASE ONE", "Phase One"),
    ("APPLE", "Apple"),
    ("GOOGLE", "Google"),
    ("HUAWEI", "Huawei"),
    ("XIAOMI", "Xiaomi"),
    ("ONEPLUS", "OnePlus"),
    ("LOGITECH", "Logitech"),
    ("BLACKMAGIC DESIGN", "Blackmagic Design"),
    ("RED DIGITAL CINEMA", "RED Digital Cinema"),
    ("SHARP", "Sharp"),
    ("VIVITAR", "Vivitar"),
    ("YASHICA", "Yashica"),
    ("BELL & HOWELL", "Bell & Howell"),
    ("TAMRON", "Tamron"),
    ("TOKINA", "Tokina"),
    ("HOLGA", "Holga"),
    ("POLAROID", "Polaroid"),
    ("AGFAPHOTO", "AgfaPhoto"),
    ("AGFA", "Agfa"),
    ("LOMOGRAPHY", "Lomography"),
    ("MEIKE", "Meike"),
    ("SJCAM", "SJCAM"),
    ("AKASO", "Akaso"),
    ("INSTA360", "Insta360"),
    ("Z CAM", "Z CAM"),
    ("IKONOSKOP", "Ikonoskop"),
    ("ARRI", "ARRI"),
    ("KINEFINITY", "Kinefinity"),
    ("ZEISS", "Zeiss"),
    ("ROLLEI", "Rollei"),
    ("THINKWARE", "Thinkware"),
    ("NEXTBASE", "Nextbase"),
    ("GARMIN", "Garmin"),
    ("PAPAGO", "Papago"),
    ("VIOFO", "Viofo"),
    ("NORITSU KOKI", "Noritsu Koki"),
    ("MOTO", "Motorola"),
    ("MOTOROLA", "Motorola"),
];

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_uppercase().contains(&needle.to_uppercase())
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Brand for a raw make string. Mixed-case makes are trusted as written.
pub fn normalize_make(make: &str) -> String {
    let make = make.trim();
    if make.is_empty() {
        return String::new();
    }

    if let Some((_, brand)) = CORPORATE_NAMES
        .iter()
        .find(|(corporate, _)| contains_ignore_case(make, corporate))
    {
        return brand.to_string();
    }

    let upper = make.to_uppercase();
    let stripped = CORPORATE_SUFFIXES
        .iter()
        .find_map(|suffix| upper.strip_suffix(suffix))
        .unwrap_or(&upper);

    let all_caps = make == upper;
    if all_caps || stripped.len() != upper.len() {
        if let Some((_, brand)) = MAKERS.iter().find(|(key, _)| *key == stripped) {
            return brand.to_string();
        }
    }

    if stripped.len() != upper.len() {
        // Keep the caller's casing, minus the suffix.
        return make.get(..stripped.len()).unwrap_or(make).trim_end().to_string();
    }
    make.to_string()
}

/// `"<make> <model>"` with the make dropped when the model already names it.
/// None when both parts are blank.
pub fn normalize(make: Option<&str>, model: Option<&str>) -> Option<String> {
    let make = make.unwrap_or_default().trim();
    let model = model.unwrap_or_default().trim();

    let device = match (make.is_empty(), model.is_empty()) {
        (true, true) => return None,
        (false, true) => normalize_make(make),
        (true, false) => model.to_string(),
        (false, false) => {
            let brand = normalize_make(make);
            if model.starts_with(make) || brand.is_empty() {
                model.to_string()
            } else if starts_with_ignore_case(model, &brand) {
                format!("{brand}{}", &model[brand.len()..])
            } else if contains_ignore_case(model, &brand) {
                model.to_string()
            } else {
                format!("{brand} {model}")
            }
        }
    };

    let collapsed = device.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}
