//! Name packing and display helpers.

/// Longest name that fits in a base-37 long.
pub const MAX_NAME_LENGTH: usize = 12;

const BASE37_CHARS: [char; 37] = [
    '_', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r',
    's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Packs up to twelve characters of `name` into a base-37 long. Letters are
/// case-insensitive; anything else counts as a space.
pub fn encode_base37(name: &str) -> u64 {
    let mut value = 0u64;
    for c in name.chars().take(MAX_NAME_LENGTH) {
        value *= 37;
        value += match c {
            'A'..='Z' => 1 + (c as u64 - 'A' as u64),
            'a'..='z' => 1 + (c as u64 - 'a' as u64),
            '0'..='9' => 27 + (c as u64 - '0' as u64),
            _ => 0,
        };
    }
    while value != 0 && value % 37 == 0 {
        value /= 37;
    }
    value
}

/// Inverse of [`encode_base37`], with spaces rendered as underscores.
pub fn decode_base37(mut value: u64) -> String {
    let mut out = Vec::with_capacity(MAX_NAME_LENGTH);
    while value != 0 && out.len() < MAX_NAME_LENGTH {
        out.push(BASE37_CHARS[(value % 37) as usize]);
        value /= 37;
    }
    out.iter().rev().collect()
}

/// Capitalises each space-separated word, lowercasing the rest.
pub fn format_name(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
