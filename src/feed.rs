//! Feed sources and the streaming XML feed reader.
//!
//! [`FeedSource`] resolves a path or `http(s)://` URL to raw bytes.
//! [`FeedReader`] pulls quick-xml events over those bytes and yields
//! [`FeedRecord`]s one at a time, so the whole document is never held as a
//! tree. Recognised layout:
//!
//! ```text
//! <yml_catalog>
//!   <shop>
//!     <categories>
//!       <category id="1" parentId="0">Name</category>
//!     </categories>
//!     <offers>
//!       <offer id="p1">
//!         <name/> <price/> <url/> <vendorCode/> <picture/>*
//!         <categoryId/>*  and/or  <categories><categoryId/>*</categories>
//!       </offer>
//!     </offers>
//!   </shop>
//! </yml_catalog>
//! ```
//!
//! The root element name is not checked. Unknown elements are ignored.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use catalog_core::models::{FeedRecord, FeedSection, RawCategory, RawOffer};
use catalog_core::{CatalogError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Where a feed comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    File(PathBuf),
    Url(String),
}

impl FeedSource {
    /// `http://` and `https://` prefixes select [`FeedSource::Url`];
    /// anything else is a local path.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            FeedSource::Url(s.to_string())
        } else {
            FeedSource::File(PathBuf::from(s))
        }
    }

    /// Read the whole feed. Any failure to obtain the bytes is
    /// [`CatalogError::FeedNotFound`].
    pub async fn fetch(&self, timeout: Duration) -> Result<Vec<u8>> {
        match self {
            FeedSource::File(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|e| CatalogError::FeedNotFound {
                        source_name: path.display().to_string(),
                        reason: e.to_string(),
                    })
            }
            FeedSource::Url(url) => fetch_url(url, timeout).await.map_err(|e| {
                CatalogError::FeedNotFound {
                    source_name: url.clone(),
                    reason: e.to_string(),
                }
            }),
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedSource::File(path) => write!(f, "{}", path.display()),
            FeedSource::Url(url) => f.write_str(url),
        }
    }
}

async fn fetch_url(url: &str, timeout: Duration) -> reqwest::Result<Vec<u8>> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.get(url).send().await?.error_for_status()?;
    let bytes = response.bytes().await?;
    debug!(url, bytes = bytes.len(), "fetched feed");
    Ok(bytes.to_vec())
}

/// SHA-256 hex digest of the raw feed bytes.
pub fn feed_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OfferField {
    Name,
    Price,
    Url,
    VendorCode,
    Picture,
    CategoryId,
}

impl OfferField {
    fn from_element(name: &str) -> Option<Self> {
        match name {
            "name" => Some(OfferField::Name),
            "price" => Some(OfferField::Price),
            "url" => Some(OfferField::Url),
            "vendorCode" => Some(OfferField::VendorCode),
            "picture" => Some(OfferField::Picture),
            "categoryId" => Some(OfferField::CategoryId),
            _ => None,
        }
    }
}

/// Pull parser turning feed bytes into [`FeedRecord`]s.
pub struct FeedReader<'a> {
    reader: Reader<&'a [u8]>,
    /// Local names of the currently open elements, root first.
    path: Vec<String>,
    saw_root: bool,
    saw_shop: bool,
    category: Option<RawCategory>,
    offer: Option<RawOffer>,
    /// Offer child being captured and the depth it was opened at.
    field: Option<(OfferField, usize)>,
    text: String,
    done: bool,
}

impl<'a> FeedReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: Reader::from_reader(bytes),
            path: Vec::new(),
            saw_root: false,
            saw_shop: false,
            category: None,
            offer: None,
            field: None,
            text: String::new(),
            done: false,
        }
    }

    fn parent_is(&self, section: &str) -> bool {
        self.path.len() == 3 && self.path[1] == "shop" && self.path[2] == section
    }

    fn capturing(&self) -> bool {
        self.category.is_some() || self.field.is_some()
    }

    fn open(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let depth = self.path.len();

        if depth == 0 {
            self.saw_root = true;
        } else if depth == 1 && name == "shop" {
            self.saw_shop = true;
        } else if name == "category" && self.parent_is("categories") {
            self.category = Some(RawCategory {
                id: attribute(e, b"id")?,
                parent_id: attribute(e, b"parentId")?,
                name: String::new(),
            });
            self.text.clear();
        } else if name == "offer" && self.parent_is("offers") {
            self.offer = Some(RawOffer {
                id: attribute(e, b"id")?,
                ..Default::default()
            });
        } else if self.offer.is_some() && self.field.is_none() {
            let field = if depth == 4 {
                OfferField::from_element(&name)
            } else if depth == 5 && self.path[4] == "categories" && name == "categoryId" {
                Some(OfferField::CategoryId)
            } else {
                None
            };
            if let Some(field) = field {
                self.field = Some((field, depth));
                self.text.clear();
            }
        }

        self.path.push(name);
        Ok(())
    }

    fn close(&mut self) -> Result<Option<FeedRecord>> {
        let Some(name) = self.path.pop() else {
            return Err(CatalogError::feed_parse("closing tag without an open element"));
        };
        let depth = self.path.len();

        if let Some((field, at)) = self.field {
            if at == depth {
                self.field = None;
                let value = std::mem::take(&mut self.text).trim().to_string();
                if let Some(offer) = self.offer.as_mut() {
                    match field {
                        OfferField::Name => offer.name = Some(value),
                        OfferField::Price => offer.price = Some(value),
                        OfferField::Url => offer.url = Some(value),
                        OfferField::VendorCode => offer.vendor_code = Some(value),
                        OfferField::Picture => offer.pictures.push(value),
                        OfferField::CategoryId => offer.category_refs.push(value),
                    }
                }
            }
            return Ok(None);
        }

        if depth == 3 && name == "category" {
            if let Some(mut category) = self.category.take() {
                category.name = std::mem::take(&mut self.text).trim().to_string();
                return Ok(Some(FeedRecord::Category(category)));
            }
        }
        if depth == 3 && name == "offer" {
            if let Some(offer) = self.offer.take() {
                return Ok(Some(FeedRecord::Offer(offer)));
            }
        }
        if depth == 2 && self.path[1] == "shop" {
            match name.as_str() {
                "categories" => return Ok(Some(FeedRecord::SectionEnd(FeedSection::Categories))),
                "offers" => return Ok(Some(FeedRecord::SectionEnd(FeedSection::Offers))),
                _ => {}
            }
        }
        Ok(None)
    }

    fn finish(&mut self) -> Option<Result<FeedRecord>> {
        self.done = true;
        if let Some(open) = self.path.last() {
            return Some(Err(CatalogError::feed_parse(format!(
                "unexpected end of document: <{}> is not closed",
                open
            ))));
        }
        if !self.saw_root {
            return Some(Err(CatalogError::feed_parse("document has no root element")));
        }
        if !self.saw_shop {
            return Some(Err(CatalogError::FeedStructure { section: "shop" }));
        }
        None
    }

    fn step(&mut self) -> Result<Step> {
        let event = self.reader.read_event().map_err(|e| {
            CatalogError::feed_parse(format!(
                "at byte {}: {}",
                self.reader.buffer_position(),
                e
            ))
        })?;
        let record = match event {
            Event::Start(e) => {
                self.open(&e)?;
                None
            }
            Event::Empty(e) => {
                self.open(&e)?;
                self.close()?
            }
            Event::End(_) => self.close()?,
            Event::Text(te) if self.capturing() => {
                let text = te
                    .unescape()
                    .map_err(|e| CatalogError::feed_parse(e.to_string()))?;
                self.text.push_str(&text);
                None
            }
            Event::CData(c) if self.capturing() => {
                self.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                None
            }
            Event::Eof => return Ok(Step::Eof),
            _ => None,
        };
        Ok(record.map_or(Step::Continue, Step::Record))
    }
}

enum Step {
    Record(FeedRecord),
    Continue,
    Eof,
}

impl Iterator for FeedReader<'_> {
    type Item = Result<FeedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.step() {
                Ok(Step::Record(record)) => return Some(Ok(record)),
                Ok(Step::Continue) => {}
                Ok(Step::Eof) => return self.finish(),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Value of attribute `key`. Every attribute is checked so duplicates and
/// malformed attributes surface as parse errors.
fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    let mut found = None;
    for attr in e.attributes() {
        let attr = attr.map_err(|err| CatalogError::feed_parse(err.to_string()))?;
        if found.is_none() && attr.key.local_name().as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|err| CatalogError::feed_parse(err.to_string()))?;
            found = Some(value.into_owned());
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(xml: &str) -> Vec<Result<FeedRecord>> {
        FeedReader::new(xml.as_bytes()).collect()
    }

    fn ok_records(xml: &str) -> Vec<FeedRecord> {
        records(xml).into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_reads_categories_and_offers() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<yml_catalog date="2024-01-01">
  <shop>
    <name>Shop name is not a category</name>
    <categories>
      <category id="1">Tools</category>
      <category id="2" parentId="1">Power &amp; hand</category>
    </categories>
    <offers>
      <offer id="p1" available="true">
        <name><![CDATA[Drill <Pro>]]></name>
        <price> 99.90 </price>
        <vendorCode>SKU-1</vendorCode>
        <picture>a.jpg</picture>
        <picture>b.jpg</picture>
        <categoryId>2</categoryId>
        <param name="color">red</param>
      </offer>
    </offers>
  </shop>
</yml_catalog>"#;
        let out = ok_records(xml);
        assert_eq!(out.len(), 5);
        assert_eq!(
            out[0],
            FeedRecord::Category(RawCategory {
                id: Some("1".into()),
                parent_id: None,
                name: "Tools".into(),
            })
        );
        assert_eq!(
            out[1],
            FeedRecord::Category(RawCategory {
                id: Some("2".into()),
                parent_id: Some("1".into()),
                name: "Power & hand".into(),
            })
        );
        assert_eq!(out[2], FeedRecord::SectionEnd(FeedSection::Categories));
        let FeedRecord::Offer(offer) = &out[3] else {
            panic!("expected offer, got {:?}", out[3]);
        };
        assert_eq!(offer.id.as_deref(), Some("p1"));
        assert_eq!(offer.name.as_deref(), Some("Drill <Pro>"));
        assert_eq!(offer.price.as_deref(), Some("99.90"));
        assert_eq!(offer.vendor_code.as_deref(), Some("SKU-1"));
        assert_eq!(offer.pictures, vec!["a.jpg", "b.jpg"]);
        assert_eq!(offer.category_refs, vec!["2"]);
        assert_eq!(offer.url, None);
        assert_eq!(out[4], FeedRecord::SectionEnd(FeedSection::Offers));
    }

    #[test]
    fn test_nested_category_shape_and_empty_elements() {
        let xml = r#"<root><shop>
            <categories><category id="7"/></categories>
            <offers>
              <offer id="x"><categories><categoryId>3</categoryId><categoryId>4</categoryId></categories><categoryId>5</categoryId><url/></offer>
              <offer id="y"/>
            </offers>
        </shop></root>"#;
        let out = ok_records(xml);
        assert_eq!(
            out[0],
            FeedRecord::Category(RawCategory {
                id: Some("7".into()),
                parent_id: None,
                name: String::new(),
            })
        );
        let FeedRecord::Offer(x) = &out[2] else {
            panic!("expected offer");
        };
        assert_eq!(x.category_refs, vec!["3", "4", "5"]);
        assert_eq!(x.url.as_deref(), Some(""));
        let FeedRecord::Offer(y) = &out[3] else {
            panic!("expected offer");
        };
        assert_eq!(y.id.as_deref(), Some("y"));
        assert_eq!(y.name, None);
    }

    #[test]
    fn test_missing_shop_is_structure_error() {
        let out = records("<yml_catalog><categories/></yml_catalog>");
        assert!(matches!(
            out.last(),
            Some(Err(CatalogError::FeedStructure { section: "shop" }))
        ));
    }

    #[test]
    fn test_malformed_documents_are_parse_errors() {
        for xml in [
            "<root><shop><categories></shop></root>",
            "<root><shop>",
            "",
            "<root><shop><offers><offer id=\"1\" id=\"2\"></offer></offers></shop></root>",
        ] {
            let out = records(xml);
            assert!(
                matches!(out.last(), Some(Err(CatalogError::FeedParse { .. }))),
                "{:?} -> {:?}",
                xml,
                out
            );
        }
    }

    #[test]
    fn test_iteration_stops_after_error() {
        let mut reader = FeedReader::new(b"<root><shop></oops></root>");
        assert!(matches!(reader.next(), Some(Err(_))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_feed_source_parse() {
        assert_eq!(
            FeedSource::parse("https://shop.example/feed.xml"),
            FeedSource::Url("https://shop.example/feed.xml".into())
        );
        assert_eq!(
            FeedSource::parse(" HTTP://a/b "),
            FeedSource::Url("HTTP://a/b".into())
        );
        assert_eq!(
            FeedSource::parse("./feeds/catalog.xml"),
            FeedSource::File(PathBuf::from("./feeds/catalog.xml"))
        );
    }

    #[test]
    fn test_digest_is_sha256_hex() {
        assert_eq!(
            feed_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_feed_not_found() {
        let source = FeedSource::parse("/definitely/not/here.xml");
        let err = source.fetch(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CatalogError::FeedNotFound { .. }));
    }
}
