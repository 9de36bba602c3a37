use crate::error::CardPressError;
use base64::Engine;
use std::collections::{HashMap, HashSet};
use tiny_skia::Pixmap;

/// Supplies raw image bytes for a resource source string (a URL, a
/// filesystem path, or a data URI). The host application decides how
/// to reach remote photos; the pipeline only sees the result.
pub trait AssetFetcher {
    fn fetch(&self, source: &str) -> Result<Vec<u8>, CardPressError>;
}

/// Default fetcher: inline data URIs and local filesystem paths.
#[derive(Debug, Default)]
pub struct FileFetcher;

impl AssetFetcher for FileFetcher {
    fn fetch(&self, source: &str) -> Result<Vec<u8>, CardPressError> {
        if let Some((_, data)) = parse_data_uri(source) {
            return Ok(data);
        }
        std::fs::read(source)
            .map_err(|err| CardPressError::Asset(format!("read {source} failed: {err}")))
    }
}

/// Decoded image resources keyed by the resource id the card template
/// references. The settle step fills this store; capture only reads it.
/// A source that fails to fetch or decode is remembered as unresolved
/// so the rasterizer can degrade to the slot background instead of
/// failing the capture.
#[derive(Default)]
pub struct AssetStore {
    images: HashMap<String, Pixmap>,
    unresolved: HashSet<String>,
    seeded: HashSet<String>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a named resource (the institution logo, typically) from
    /// raw encoded bytes. Seeded entries survive [`evict_resolved`]
    /// calls between batches.
    ///
    /// [`evict_resolved`]: AssetStore::evict_resolved
    pub fn insert_bytes(&mut self, id: &str, bytes: &[u8]) -> Result<(), CardPressError> {
        let pixmap = decode_image_to_pixmap(bytes, None)
            .ok_or_else(|| CardPressError::Asset(format!("cannot decode image for {id}")))?;
        self.images.insert(id.to_string(), pixmap);
        self.seeded.insert(id.to_string());
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Pixmap> {
        self.images.get(id)
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.images.contains_key(id) || self.unresolved.contains(id)
    }

    /// Resolve one resource through the fetcher. Fetch and decode
    /// failures are swallowed: the id is marked unresolved and the
    /// photo slot keeps its placeholder. Settle never fails a record.
    pub fn resolve(&mut self, id: &str, fetcher: &dyn AssetFetcher) {
        if self.is_known(id) {
            return;
        }
        let pixmap = fetcher
            .fetch(id)
            .ok()
            .and_then(|bytes| decode_image_to_pixmap(&bytes, None));
        match pixmap {
            Some(pixmap) => {
                self.images.insert(id.to_string(), pixmap);
            }
            None => {
                self.unresolved.insert(id.to_string());
            }
        }
    }

    /// Drop resources resolved through a fetcher, keeping pre-seeded
    /// entries. Run between batches so a photo that changed at the same
    /// source string is fetched fresh next time.
    pub fn evict_resolved(&mut self) {
        let seeded = &self.seeded;
        self.images.retain(|id, _| seeded.contains(id));
        self.unresolved.clear();
    }
}

pub(crate) fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    if !uri.starts_with("data:") {
        return None;
    }
    let parts: Vec<&str> = uri.splitn(2, ',').collect();
    if parts.len() != 2 {
        return None;
    }
    let header = parts[0];
    let data_part = parts[1];
    let mime = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains("base64") {
        base64::engine::general_purpose::STANDARD
            .decode(data_part)
            .ok()?
    } else {
        data_part.as_bytes().to_vec()
    };
    Some((mime, data))
}

pub(crate) fn decode_image_to_pixmap(data: &[u8], mime: Option<&str>) -> Option<Pixmap> {
    let guessed_format = if let Some(mime) = mime {
        if mime.contains("png") {
            Some(image::ImageFormat::Png)
        } else if mime.contains("jpeg") || mime.contains("jpg") {
            Some(image::ImageFormat::Jpeg)
        } else {
            None
        }
    } else {
        image::guess_format(data).ok()
    };

    let decoded = if let Some(fmt) = guessed_format {
        image::load_from_memory_with_format(data, fmt).ok()?
    } else {
        image::load_from_memory(data).ok()?
    };
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    let src = rgba.as_raw();
    let dst = pixmap.data_mut();
    for (src_px, dst_px) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let r = src_px[0];
        let g = src_px[1];
        let b = src_px[2];
        let a = src_px[3];
        dst_px[0] = premul_u8(r, a);
        dst_px[1] = premul_u8(g, a);
        dst_px[2] = premul_u8(b, a);
        dst_px[3] = a;
    }
    Some(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::RgbaImage;

    pub(crate) fn png_bytes(r: u8, g: u8, b: u8) -> Vec<u8> {
        let mut img = RgbaImage::new(2, 2);
        for px in img.pixels_mut() {
            *px = image::Rgba([r, g, b, 255]);
        }
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    pub(crate) struct MapFetcher(pub HashMap<String, Vec<u8>>);

    impl AssetFetcher for MapFetcher {
        fn fetch(&self, source: &str) -> Result<Vec<u8>, CardPressError> {
            self.0
                .get(source)
                .cloned()
                .ok_or_else(|| CardPressError::Asset(format!("no such asset: {source}")))
        }
    }

    #[test]
    fn data_uri_resolves_without_touching_the_filesystem() {
        let bytes = png_bytes(10, 20, 30);
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );
        let mut store = AssetStore::new();
        store.resolve(&uri, &FileFetcher);
        assert!(store.get(&uri).is_some());
    }

    #[test]
    fn broken_source_is_marked_unresolved_not_an_error() {
        let mut store = AssetStore::new();
        store.resolve("https://example.invalid/photo.png", &MapFetcher(HashMap::new()));
        assert!(store.get("https://example.invalid/photo.png").is_none());
        assert!(store.is_known("https://example.invalid/photo.png"));
    }

    #[test]
    fn undecodable_bytes_are_unresolved() {
        let mut map = HashMap::new();
        map.insert("bad".to_string(), vec![1, 2, 3, 4]);
        let mut store = AssetStore::new();
        store.resolve("bad", &MapFetcher(map));
        assert!(store.get("bad").is_none());
        assert!(store.is_known("bad"));
    }

    #[test]
    fn eviction_drops_fetched_photos_but_keeps_the_seeded_logo() {
        let mut map = HashMap::new();
        map.insert("photo-1".to_string(), png_bytes(200, 10, 10));
        let mut store = AssetStore::new();
        store.insert_bytes("logo", &png_bytes(0, 0, 0)).unwrap();
        store.resolve("photo-1", &MapFetcher(map));
        store.resolve("missing", &MapFetcher(HashMap::new()));
        store.evict_resolved();
        assert!(store.get("logo").is_some());
        assert!(store.get("photo-1").is_none());
        // Forgotten ids can be resolved again next batch.
        assert!(!store.is_known("photo-1"));
        assert!(!store.is_known("missing"));
    }

    #[test]
    fn preseeded_logo_is_served_from_the_store() {
        let mut store = AssetStore::new();
        store.insert_bytes("logo", &png_bytes(0, 0, 0)).unwrap();
        assert!(store.get("logo").is_some());
        // resolve() must not re-fetch a known id.
        store.resolve("logo", &MapFetcher(HashMap::new()));
        assert!(store.get("logo").is_some());
    }
}
