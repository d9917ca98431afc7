//! Receipt CSV record decoding
//!
//! Turns one receipt export into a lazy, finite, non-restartable sequence of
//! [`ReceiptRow`]s. The first record is a header and is discarded unread; a
//! file with no data rows is rejected as empty. The first malformed record
//! ends the sequence with an error: rows are never skipped silently.

use std::fs::File;
use std::io::Read;
use std::iter::FusedIterator;
use std::path::Path;

use csv::{ByteRecord, StringRecord};
use tracing::debug;

use crate::app::models::ReceiptRow;
use crate::constants::FIELD_COUNT;
use crate::{Error, Result};

/// Sequential decoder over the data rows of one receipt file
pub struct RecordDecoder<R> {
    reader: csv::Reader<R>,
    file: String,
    record: StringRecord,
    peeked: Option<Result<ReceiptRow>>,
    rows_read: usize,
    finished: bool,
}

impl RecordDecoder<File> {
    /// Open a file and position the decoder after its header
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::io(format!("Failed to open file {}", path.display()), e))?;
        Self::from_reader(path.display().to_string(), file)
    }
}

impl<R: Read> RecordDecoder<R> {
    /// Wrap a byte stream; `file` names the source in diagnostics
    ///
    /// Fails with [`Error::EmptyFile`] when the stream holds no header or no
    /// data rows after it.
    pub fn from_reader(file: impl Into<String>, reader: R) -> Result<Self> {
        let file = file.into();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        // Header content is not validated, so read it as raw bytes
        let mut header = ByteRecord::new();
        match reader.read_byte_record(&mut header) {
            Ok(true) => {}
            Ok(false) => return Err(Error::empty_file(file)),
            Err(e) => {
                return Err(Error::decode(
                    file,
                    0,
                    "failed to read header",
                    Some(e),
                ));
            }
        }
        debug!("Skipped header of {} ({} fields)", file, header.len());

        let mut decoder = Self {
            reader,
            file,
            record: StringRecord::new(),
            peeked: None,
            rows_read: 0,
            finished: false,
        };

        match decoder.advance() {
            Some(first) => decoder.peeked = Some(first),
            None => return Err(Error::empty_file(decoder.file)),
        }

        Ok(decoder)
    }

    /// Source name used in diagnostics
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Number of data rows read so far, including a malformed one
    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    fn advance(&mut self) -> Option<Result<ReceiptRow>> {
        if self.finished {
            return None;
        }

        let outcome = match self.reader.read_record(&mut self.record) {
            Ok(false) => None,
            Ok(true) => {
                self.rows_read += 1;
                Some(self.decode_current())
            }
            Err(e) => {
                self.rows_read += 1;
                Some(Err(Error::decode(
                    &self.file,
                    self.rows_read,
                    "malformed record",
                    Some(e),
                )))
            }
        };

        if !matches!(outcome, Some(Ok(_))) {
            self.finished = true;
        }
        outcome
    }

    fn decode_current(&self) -> Result<ReceiptRow> {
        if self.record.len() != FIELD_COUNT {
            return Err(Error::decode(
                &self.file,
                self.rows_read,
                format!(
                    "expected {} fields, found {}",
                    FIELD_COUNT,
                    self.record.len()
                ),
                None,
            ));
        }
        ReceiptRow::from_record(&self.record)
    }
}

impl<R: Read> Iterator for RecordDecoder<R> {
    type Item = Result<ReceiptRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.peeked.take() {
            Some(row) => Some(row),
            None => self.advance(),
        }
    }
}

impl<R: Read> FusedIterator for RecordDecoder<R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::Column;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "Receipt ID,Seller,Venue,Date and time,Customer name,Payment method,Delivery address,Item name,Quantity,Unit price,Line total,Subtotal,Tax,Delivery fee,Tip,Grand total";

    fn decoder_for(content: &[u8]) -> Result<RecordDecoder<&[u8]>> {
        RecordDecoder::from_reader("test.csv", content)
    }

    #[test]
    fn test_decodes_rows_after_header() {
        let content = format!(
            "{}\nR1,ShopA,Mall1,01.03.2024 14:30,Alice,card,123 St,Coffee,2,3.50,7.00,6.00,0.60,0.00,0.40,7.00\n\
             R1,ShopA,Mall1,01.03.2024 14:30,Alice,card,123 St,Bagel,1,2.00,2.00,6.00,0.60,0.00,0.40,7.00\n",
            HEADER
        );

        let rows: Vec<_> = decoder_for(content.as_bytes())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(Column::ItemName), "Coffee");
        assert_eq!(rows[1].get(Column::ItemName), "Bagel");
        assert_eq!(rows[1].get(Column::GrandTotal), "7.00");
    }

    #[test]
    fn test_header_is_not_validated() {
        let content = "whatever\nR1,ShopA,Mall1,01.03.2024 14:30,Alice,card,123 St,Coffee,2,3.50,7.00,6.00,0.60,0.00,0.40,7.00\n";

        let rows: Vec<_> = decoder_for(content.as_bytes()).unwrap().collect();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_ok());
    }

    #[test]
    fn test_quoted_fields_with_commas() {
        let content = format!(
            "{}\nR1,ShopA,Mall1,01.03.2024 14:30,Alice,card,\"12 Main St, Apt 4\",\"Tea, green\",1,3.00,3.00,3.00,0.00,0.00,0.00,3.00\n",
            HEADER
        );

        let row = decoder_for(content.as_bytes())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(row.get(Column::DeliveryAddress), "12 Main St, Apt 4");
        assert_eq!(row.get(Column::ItemName), "Tea, green");
    }

    #[test]
    fn test_zero_byte_file_is_empty() {
        let result = decoder_for(b"");
        assert!(matches!(result, Err(Error::EmptyFile { .. })));
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let content = format!("{}\n", HEADER);
        let result = decoder_for(content.as_bytes());
        assert!(matches!(result, Err(Error::EmptyFile { .. })));
    }

    #[test]
    fn test_wrong_field_count_stops_decoding() {
        let content = format!(
            "{}\nR1,ShopA,Mall1,01.03.2024 14:30,Alice,card,123 St,Coffee,2,3.50,7.00,6.00,0.60,0.00,0.40,7.00\n\
             R2,ShopA,Mall1\n\
             R3,ShopA,Mall1,01.03.2024 14:30,Alice,card,123 St,Coffee,2,3.50,7.00,6.00,0.60,0.00,0.40,7.00\n",
            HEADER
        );

        let mut decoder = decoder_for(content.as_bytes()).unwrap();
        assert!(decoder.next().unwrap().is_ok());

        match decoder.next() {
            Some(Err(Error::Decode { row, message, .. })) => {
                assert_eq!(row, 2);
                assert!(message.contains("expected 16 fields, found 3"));
            }
            other => panic!("Expected decode error, got {:?}", other.map(|r| r.is_ok())),
        }

        assert!(decoder.next().is_none());
        assert!(decoder.next().is_none());
        assert_eq!(decoder.rows_read(), 2);
    }

    #[test]
    fn test_malformed_first_row_is_reported() {
        let content = format!("{}\nonly,three,fields\n", HEADER);

        let mut decoder = decoder_for(content.as_bytes()).unwrap();
        assert!(matches!(decoder.next(), Some(Err(Error::Decode { .. }))));
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_a_decode_error() {
        let mut content = format!("{}\n", HEADER).into_bytes();
        content.extend_from_slice(b"R1,Shop\xff,Mall1,01.03.2024 14:30,Alice,card,123 St,Coffee,2,3.50,7.00,6.00,0.60,0.00,0.40,7.00\n");

        let mut decoder = decoder_for(&content).unwrap();
        assert!(matches!(decoder.next(), Some(Err(Error::Decode { .. }))));
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_from_path() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "{}", HEADER).unwrap();
        writeln!(
            temp_file,
            "R9,ShopB,Station,05.06.2024 08:05,Bob,cash,1 Road,Tea,1,1.20,1.20,1.20,0.00,0.00,0.00,1.20"
        )
        .unwrap();

        let decoder = RecordDecoder::from_path(temp_file.path()).unwrap();
        assert!(decoder.file().ends_with(
            temp_file
                .path()
                .file_name()
                .unwrap()
                .to_str()
                .unwrap()
        ));

        let rows: Vec<_> = decoder.collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].receipt_id(), "R9");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = RecordDecoder::from_path(Path::new("/nonexistent/receipts.csv"));
        assert!(matches!(result, Err(Error::Io { .. })));
    }
}
