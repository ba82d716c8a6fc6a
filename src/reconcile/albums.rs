use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::track::{SINGLE_ALBUM_TYPE, Track};

/// One row of the missing-albums report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingAlbum {
    pub artist: String,
    pub album: String,
    pub album_url: String,
    pub album_type: String,
    pub genre: String,
}

/// Groups missing tracks by `(artist, album)`.
///
/// The first track seen for a group decides its url, type and genre.
/// Rows come out sorted by `(artist, album)`, singles left out.
pub fn aggregate(missing: &[Track]) -> Vec<MissingAlbum> {
    let mut groups: BTreeMap<(String, String), (String, String, String)> = BTreeMap::new();
    for track in missing {
        groups
            .entry((track.artist.clone(), track.album.clone()))
            .or_insert_with(|| {
                (
                    track.album_url.clone(),
                    track.album_type.clone(),
                    track.genre.clone(),
                )
            });
    }

    groups
        .into_iter()
        .filter(|(_, (_, album_type, _))| album_type != SINGLE_ALBUM_TYPE)
        .map(|((artist, album), (album_url, album_type, genre))| MissingAlbum {
            artist,
            album,
            album_url,
            album_type,
            genre,
        })
        .collect()
}
