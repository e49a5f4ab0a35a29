//! English rendering helpers: numbers in words, list joining, articles,
//! plurals and human-readable element labels.

use crate::data::{Element, Feature};

const ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

const SCALES: [(u64, &str); 6] = [
    (1_000_000_000_000_000_000, "quintillion"),
    (1_000_000_000_000_000, "quadrillion"),
    (1_000_000_000_000, "trillion"),
    (1_000_000_000, "billion"),
    (1_000_000, "million"),
    (1_000, "thousand"),
];

fn under_hundred(n: u64) -> String {
    debug_assert!(n < 100);
    if n < 20 {
        ONES[n as usize].to_string()
    } else if n % 10 == 0 {
        TENS[(n / 10) as usize].to_string()
    } else {
        format!("{}-{}", TENS[(n / 10) as usize], ONES[(n % 10) as usize])
    }
}

fn under_thousand(n: u64) -> String {
    debug_assert!(n < 1000);
    let hundreds = n / 100;
    let rest = n % 100;
    match (hundreds, rest) {
        (0, _) => under_hundred(rest),
        (_, 0) => format!("{} hundred", ONES[hundreds as usize]),
        _ => format!("{} hundred and {}", ONES[hundreds as usize], under_hundred(rest)),
    }
}

/// `105` -> `"one hundred and five"`.
pub fn number_to_words(n: u64) -> String {
    if n == 0 {
        return ONES[0].to_string();
    }

    let mut parts: Vec<String> = Vec::new();
    let mut rest = n;
    for (size, name) in SCALES {
        if rest >= size {
            parts.push(format!("{} {}", under_thousand(rest / size), name));
            rest %= size;
        }
    }

    if rest == 0 {
        return parts.join(", ");
    }
    if parts.is_empty() {
        return under_thousand(rest);
    }
    if rest < 100 {
        format!("{} and {}", parts.join(", "), under_hundred(rest))
    } else {
        parts.push(under_thousand(rest));
        parts.join(", ")
    }
}

/// Joins items as "a", "a and b" or "a, b, and c".
pub fn join_list<S: AsRef<str>>(items: &[S]) -> String {
    match items {
        [] => String::new(),
        [only] => only.as_ref().to_string(),
        [first, second] => format!("{} and {}", first.as_ref(), second.as_ref()),
        [init @ .., last] => {
            let init: Vec<&str> = init.iter().map(AsRef::as_ref).collect();
            format!("{}, and {}", init.join(", "), last.as_ref())
        }
    }
}

pub fn indefinite_article(word: &str) -> &'static str {
    let lower = word.to_lowercase();
    if ["hour", "honest", "honour", "heir"].iter().any(|p| lower.starts_with(p)) {
        return "an";
    }
    if ["uni", "use", "usu", "one", "eu"].iter().any(|p| lower.starts_with(p)) {
        return "a";
    }
    match lower.chars().next() {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    }
}

/// Plural of a noun phrase; only the last word is inflected.
pub fn pluralize(phrase: &str) -> String {
    let (head, last) = match phrase.rfind(' ') {
        Some(idx) => phrase.split_at(idx + 1),
        None => ("", phrase),
    };

    let plural = match last {
        "person" => "people".to_string(),
        "child" => "children".to_string(),
        "man" => "men".to_string(),
        "woman" => "women".to_string(),
        _ if ["s", "x", "z", "ch", "sh"].iter().any(|end| last.ends_with(end)) => {
            format!("{}es", last)
        }
        _ if last.ends_with('y') && !last.ends_with("ay") && !last.ends_with("ey")
            && !last.ends_with("oy") && !last.ends_with("uy") =>
        {
            format!("{}ies", &last[..last.len() - 1])
        }
        _ => format!("{}s", last),
    };
    format!("{}{}", head, plural)
}

/// The element's own name, falling back to `ref`, then to type and id.
pub fn common_name(element: &Element) -> String {
    element
        .tag("name")
        .or_else(|| element.tag("ref"))
        .map(str::to_string)
        .unwrap_or_else(|| element.key().to_string())
}

/// How a lone element of `feature` reads in a sentence.
pub fn display_name(element: &Element, feature: &Feature) -> String {
    match element.tag("name") {
        Some(name) => format!("{} \"{}\"", feature.name, name),
        None => format!("{} {}", indefinite_article(&feature.name), feature.name),
    }
}
