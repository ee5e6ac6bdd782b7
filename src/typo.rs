use rand::Rng;

fn qwerty_neighbors(lower: char) -> &'static [char] {
    match lower {
        'q' => &['w', 'a'],
        'w' => &['q', 'e', 'a', 's'],
        'e' => &['w', 'r', 's', 'd'],
        'r' => &['e', 't', 'd', 'f'],
        't' => &['r', 'y', 'f', 'g'],
        'y' => &['t', 'u', 'g', 'h'],
        'u' => &['y', 'i', 'h', 'j'],
        'i' => &['u', 'o', 'j', 'k'],
        'o' => &['i', 'p', 'k', 'l'],
        'p' => &['o', 'l'],
        'a' => &['q', 'w', 's', 'z'],
        's' => &['a', 'w', 'e', 'd', 'x', 'z'],
        'd' => &['s', 'e', 'r', 'f', 'c', 'x'],
        'f' => &['d', 'r', 't', 'g', 'v', 'c'],
        'g' => &['f', 't', 'y', 'h', 'b', 'v'],
        'h' => &['g', 'y', 'u', 'j', 'n', 'b'],
        'j' => &['h', 'u', 'i', 'k', 'm', 'n'],
        'k' => &['j', 'i', 'o', 'l', 'm'],
        'l' => &['k', 'o', 'p'],
        'z' => &['a', 's', 'x'],
        'x' => &['z', 's', 'd', 'c'],
        'c' => &['x', 'd', 'f', 'v'],
        'v' => &['c', 'f', 'g', 'b'],
        'b' => &['v', 'g', 'h', 'n'],
        'n' => &['b', 'h', 'j', 'm'],
        'm' => &['n', 'j', 'k'],
        _ => &[],
    }
}

/// A random key next to `c` on a US-QWERTY keyboard, in the same case.
/// Only letters have neighbours.
pub fn neighbor_key(c: char, rng: &mut impl Rng) -> Option<char> {
    let neighbors = qwerty_neighbors(c.to_ascii_lowercase());
    if neighbors.is_empty() {
        return None;
    }

    let chosen = neighbors[rng.gen_range(0..neighbors.len())];
    Some(if c.is_ascii_uppercase() {
        chosen.to_ascii_uppercase()
    } else {
        chosen
    })
}

/// Decide whether to fumble `c`. Returns the char to emit and whether it is a typo.
pub fn maybe_typo(c: char, probability: f64, rng: &mut impl Rng) -> (char, bool) {
    if !rng.gen_bool(probability) {
        return (c, false);
    }
    match neighbor_key(c, rng) {
        Some(wrong) => (wrong, true),
        None => (c, false),
    }
}
