//! ID3v1 numeric genres, including the Winamp extensions.

const GENRES: [&str; 192] = [
    "Blues", "Classic Rock", "Country", "Dance", "Disco", "Funk", "Grunge", "Hip-Hop", "Jazz",
    "Metal", "New Age", "Oldies", "Other", "Pop", "R&B", "Rap", "Reggae", "Rock", "Techno",
    "Industrial", "Alternative", "Ska", "Death Metal", "Pranks", "Soundtrack", "Euro-Techno",
    "Ambient", "Trip-Hop", "Vocal", "Jazz+Funk", "Fusion", "Trance", "Classical", "Instrumental",
    "Acid", "House", "Game", "Sound Clip", "Gospel", "Noise", "AlternRock", "Bass", "Soul", "Punk",
    "Space", "Meditative", "Instrumental Pop", "Instrumental Rock", "Ethnic", "Gothic", "Darkwave",
    "Techno-Industrial", "Electronic", "Pop-Folk", "Eurodance", "Dream", "Southern Rock", "Comedy",
    "Cult", "Gangsta", "Top 40", "Christian Rap", "Pop/Funk", "Jungle", "Native American",
    "Cabaret", "New Wave", "Psychedelic", "Rave", "Showtunes", "Trailer", "Lo-Fi", "Tribal",
    "Acid Punk", "Acid Jazz", "Polka", "Retro", "Musical", "Rock & Roll", "Hard Rock",
    // Winamp extensions
    "Folk", "Folk-Rock", "National Folk", "Swing", "Fast Fusion", "Bebop", "Latin", "Revival",
    "Celtic", "Bluegrass", "Avantgarde", "Gothic Rock", "Progressive Rock", "Psychedelic Rock",
    "Symphonic Rock", "Slow Rock", "Big Band", "Chorus", "Easy Listening", "Acoustic", "Humour",
    "Speech", "Chanson", "Opera", "Chamber Music", "Sonata", "Symphony", "Booty Bass", "Primus",
    "Porn Groove", "Satire", "Slow Jam", "Club", "Tango", "Samba", "Folklore", "Ballad",
    "Power Ballad", "Rhythmic Soul", "Freestyle", "Duet", "Punk Rock", "Drum Solo", "A capella",
    "Euro-House", "Dance Hall", "Goa", "Drum & Bass", "Club-House", "Hardcore", "Terror", "Indie",
    "BritPop", "Afro-Punk", "Polsk Punk", "Beat", "Christian Gangsta Rap", "Heavy Metal",
    "Black Metal", "Crossover", "Contemporary Christian", "Christian Rock", "Merengue", "Salsa",
    "Thrash Metal", "Anime", "JPop", "Synthpop", "Abstract", "Art Rock", "Baroque", "Bhangra",
    "Big Beat", "Breakbeat", "Chillout", "Downtempo", "Dub", "EBM", "Eclectic", "Electro",
    "Electroclash", "Emo", "Experimental", "Garage", "Global", "IDM", "Illbient", "Industro-Goth",
    "Jam Band", "Krautrock", "Leftfield", "Lounge", "Math Rock", "New Romantic", "Nu-Breakz",
    "Post-Punk", "Post-Rock", "Psytrance", "Shoegaze", "Space Rock", "Trop Rock", "World Music",
    "Neoclassical", "Audiobook", "Audio Theatre", "Neue Deutsche Welle", "Podcast", "Indie Rock",
    "G-Funk", "Dubstep", "Garage Rock", "Psybient",
];

/// Genre name for a zero-based ID3v1 index.
pub fn by_index(index: i64) -> Option<&'static str> {
    usize::try_from(index).ok().and_then(|i| GENRES.get(i)).copied()
}

/// Resolve ID3v2 genre text: `"17"`, `"(17)"`, `"(17)Rock"`, `"(RX)"`, `"(CR)"`,
/// or free text, which passes through.
pub fn resolve(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(index) = text.parse::<i64>() {
        return by_index(index).map(str::to_string);
    }

    if let Some(rest) = text.strip_prefix('(') {
        if let Some((reference, refinement)) = rest.split_once(')') {
            let refinement = refinement.trim();
            if !refinement.is_empty() && !refinement.starts_with('(') {
                return Some(refinement.to_string());
            }
            return match reference {
                "RX" => Some("Remix".to_string()),
                "CR" => Some("Cover".to_string()),
                r => r.parse::<i64>().ok().and_then(by_index).map(str::to_string),
            };
        }
    }

    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_lookup() {
        assert_eq!(by_index(0), Some("Blues"));
        assert_eq!(by_index(17), Some("Rock"));
        assert_eq!(by_index(80), Some("Folk"));
        assert_eq!(by_index(191), Some("Psybient"));
        assert_eq!(by_index(192), None);
        assert_eq!(by_index(255), None);
        assert_eq!(by_index(-1), None);
    }

    #[test]
    fn textual_references() {
        assert_eq!(resolve("17").as_deref(), Some("Rock"));
        assert_eq!(resolve("(17)").as_deref(), Some("Rock"));
        assert_eq!(resolve("(4)Eurodisco").as_deref(), Some("Eurodisco"));
        assert_eq!(resolve("(RX)").as_deref(), Some("Remix"));
        assert_eq!(resolve("(9)(138)").as_deref(), Some("Metal"));
        assert_eq!(resolve("Shoegaze").as_deref(), Some("Shoegaze"));
        assert_eq!(resolve("  "), None);
        assert_eq!(resolve("(999)"), None);
    }
}
