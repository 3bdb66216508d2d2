/// Levenshtein distance counted in characters.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let (short, long) = if a.chars().count() <= b.chars().count() { (a, b) } else { (b, a) };
    let short: Vec<char> = short.chars().collect();

    let mut prev: Vec<usize> = (0..=short.len()).collect();
    let mut row = vec![0; short.len() + 1];
    for (j, cb) in long.chars().enumerate() {
        row[0] = j + 1;
        for (i, ca) in short.iter().enumerate() {
            row[i + 1] = if *ca == cb {
                prev[i]
            } else {
                1 + prev[i].min(prev[i + 1]).min(row[i])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[short.len()]
}
