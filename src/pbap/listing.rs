// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! vCard-listing XML documents.

const LISTING_HEAD: &str = concat!(
    "<?xml version=\"1.0\"?>",
    "<!DOCTYPE vcard-listing SYSTEM \"vcard-listing.dtd\">",
    "<vCard-listing version=\"1.0\">"
);
const LISTING_TAIL: &str = "</vCard-listing>";

/// One `<card>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub handle: usize,
    pub name: String,
}

impl ListingEntry {
    pub fn new(handle: usize, name: impl Into<String>) -> Self {
        Self {
            handle,
            name: name.into(),
        }
    }
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}

pub fn build_listing_xml(entries: &[ListingEntry]) -> String {
    let mut xml = String::from(LISTING_HEAD);
    for entry in entries {
        xml.push_str(&format!(
            "<card handle=\"{}.vcf\" name=\"{}\"/>",
            entry.handle,
            escape_xml(&entry.name)
        ));
    }
    xml.push_str(LISTING_TAIL);
    xml
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_listing() {
        assert_eq!(
            build_listing_xml(&[]),
            "<?xml version=\"1.0\"?><!DOCTYPE vcard-listing SYSTEM \"vcard-listing.dtd\">\
             <vCard-listing version=\"1.0\"></vCard-listing>"
        );
    }

    #[test]
    fn test_listing_escapes_names() {
        let xml = build_listing_xml(&[
            ListingEntry::new(0, "Me"),
            ListingEntry::new(3, "Tom & \"Jerry\" <co> O'Neil"),
        ]);
        assert!(xml.contains("<card handle=\"0.vcf\" name=\"Me\"/>"));
        assert!(xml.contains(
            "<card handle=\"3.vcf\" name=\"Tom &amp; &quot;Jerry&quot; &lt;co&gt; O&#039;Neil\"/>"
        ));
        assert!(xml.ends_with("</vCard-listing>"));
    }
}
