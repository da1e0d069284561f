use std::collections::HashSet;

/// Splits `name` into stem and extension. Names whose only dot is the leading
/// one (`.profile`) have no extension.
fn split_name(name: &str) -> (&str, Option<&str>) {
    if let Some((stem, ext)) = name.rsplit_once('.')
        && !stem.is_empty()
    {
        return (stem, Some(ext));
    }
    (name, None)
}

pub fn numbered_name(name: &str, n: u32) -> String {
    match split_name(name) {
        (stem, Some(ext)) => format!("{stem} ({n}).{ext}"),
        (stem, None) => format!("{stem} ({n})"),
    }
}

/// Returns `name` unchanged if it is free among `taken`, otherwise the first
/// `base (n).ext` that is, counting from 1.
pub fn disambiguate<'a, I>(name: &str, taken: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: HashSet<&str> = taken.into_iter().collect();
    if !taken.contains(name) {
        return name.to_string();
    }
    (1..)
        .map(|n| numbered_name(name, n))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| name.to_string())
}
