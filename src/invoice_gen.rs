use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use rust_decimal::Decimal;

use crate::error::Result;
use crate::invoicing::{self, LineInput};
use crate::mail::OutgoingAttachment;
use crate::models::{Client, Invoice, InvoiceLineItem, Profile};
use crate::validation::format::format_iban;

/// Service for generating invoice files in Markdown and PDF format
pub struct InvoiceGenerator {
    output_dir: PathBuf,
}

/// Dutch notation: thousands separated by dots, decimal comma.
/// `factuur_{number}`, with anything but ASCII letters, digits, `-` and `_`
/// replaced so the name stays inside the output directory.
fn file_stem(number: &str) -> String {
    let safe: String = number
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') { c } else { '_' })
        .collect();
    format!("factuur_{safe}")
}

fn euro(amount: Decimal) -> String {
    let rounded = invoicing::round_cents(amount);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::new();
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    format!("{}€ {grouped},{cents}", if negative { "-" } else { "" })
}

impl InvoiceGenerator {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        // Create the output directory if it doesn't exist
        let path = output_dir.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        Ok(Self {
            output_dir: path.to_path_buf(),
        })
    }

    /// Generate a Markdown invoice file and convert it to PDF using pandoc if available
    pub fn generate_invoice(
        &self,
        invoice: &Invoice,
        line_items: &[InvoiceLineItem],
        profile: &Profile,
        client: &Client,
    ) -> Result<(PathBuf, PathBuf)> {
        let markdown = self.generate_markdown(invoice, line_items, profile, client);

        let stem = file_stem(&invoice.number);
        let md_path = self.output_dir.join(format!("{stem}.md"));
        let pdf_path = self.output_dir.join(format!("{stem}.pdf"));

        let mut file = File::create(&md_path)?;
        file.write_all(markdown.as_bytes())?;

        match Command::new("pandoc").arg(&md_path).arg("-o").arg(&pdf_path).output() {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                let error = String::from_utf8_lossy(&output.stderr);
                tracing::warn!(number = %invoice.number, %error, "pandoc failed, attaching markdown instead");
                fs::copy(&md_path, &pdf_path)?;
            }
            Err(e) => {
                tracing::warn!(number = %invoice.number, error = %e, "pandoc not available, attaching markdown instead");
                fs::copy(&md_path, &pdf_path)?;
            }
        }

        Ok((md_path, pdf_path))
    }

    /// Generates the files and wraps the PDF, or its Markdown stand-in, as a mail attachment.
    pub fn attachment(
        &self,
        invoice: &Invoice,
        line_items: &[InvoiceLineItem],
        profile: &Profile,
        client: &Client,
    ) -> Result<OutgoingAttachment> {
        let (_, pdf_path) = self.generate_invoice(invoice, line_items, profile, client)?;
        let content = fs::read(&pdf_path)?;

        // the stand-in is plain Markdown, not a PDF
        let stem = file_stem(&invoice.number);
        let (filename, mime) = if content.starts_with(b"%PDF") {
            (format!("{stem}.pdf"), mime::APPLICATION_PDF)
        } else {
            (format!("{stem}.md"), mime::TEXT_PLAIN_UTF_8)
        };

        Ok(OutgoingAttachment { filename, content, mime })
    }

    /// Generate Markdown content for the invoice
    pub fn generate_markdown(
        &self,
        invoice: &Invoice,
        line_items: &[InvoiceLineItem],
        profile: &Profile,
        client: &Client,
    ) -> String {
        let mut content = String::new();

        content.push_str(&format!("# {}\n\n", profile.name));
        for line in [&profile.address, &profile.postal_code, &profile.city].into_iter().flatten() {
            content.push_str(&format!("{line}  \n"));
        }
        content.push_str(&format!("{}  \n", profile.email));
        content.push_str(&format!("KvK: {}  \n", profile.kvk_number));
        content.push_str(&format!("BTW-id: {}\n\n", profile.vat_id));

        content.push_str("## Factuur\n\n");
        content.push_str("| | |\n|---|---|\n");
        content.push_str(&format!("| Factuurnummer | {} |\n", invoice.number));
        content.push_str(&format!("| Factuurdatum | {} |\n", invoice.issue_date.format("%d-%m-%Y")));
        content.push_str(&format!("| Vervaldatum | {} |\n\n", invoice.due_date.format("%d-%m-%Y")));

        content.push_str("**Factuur aan**  \n");
        content.push_str(&format!("{}  \n", client.name));
        for line in [&client.address, &client.postal_code, &client.city].into_iter().flatten() {
            content.push_str(&format!("{line}  \n"));
        }
        if let Some(kvk) = &client.kvk_number {
            content.push_str(&format!("KvK: {kvk}  \n"));
        }
        if let Some(vat) = &client.vat_id {
            content.push_str(&format!("BTW-id: {vat}  \n"));
        }
        content.push('\n');

        content.push_str("| Omschrijving | Aantal | Prijs | BTW | Bedrag |\n");
        content.push_str("|---|---:|---:|---:|---:|\n");
        for item in line_items {
            content.push_str(&format!(
                "| {} | {} | {} | {}% | {} |\n",
                item.description.replace('|', "/"),
                item.quantity.normalize(),
                euro(item.unit_price),
                item.vat_rate.percentage(),
                euro(invoicing::line_amount(item.quantity, item.unit_price)),
            ));
        }
        content.push('\n');

        let lines: Vec<LineInput> = line_items.iter().map(LineInput::from).collect();
        let totals = invoicing::calculate_totals(&lines, invoice.reverse_charge);

        content.push_str(&format!("Subtotaal: {}  \n", euro(totals.subtotal)));
        if invoice.reverse_charge {
            content.push_str("BTW verlegd  \n");
        } else {
            for group in &totals.vat_groups {
                content.push_str(&format!(
                    "BTW {}% over {}: {}  \n",
                    group.rate.percentage(),
                    euro(group.base),
                    euro(group.vat)
                ));
            }
        }
        content.push_str(&format!("**Totaal: {}**\n\n", euro(totals.total)));

        if let Some(notes) = &invoice.notes {
            content.push_str(&format!("{notes}\n\n"));
        }

        content.push_str(&format!(
            "Gelieve het totaalbedrag voor {} over te maken op {} t.n.v. {} onder vermelding van factuurnummer {}.\n",
            invoice.due_date.format("%d-%m-%Y"),
            format_iban(&profile.iban),
            profile.name,
            invoice.number,
        ));

        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    use crate::models::{InvoiceStatus, PaymentTerm, VatRate};
    use crate::validation::tests::sample_client;

    fn profile() -> Profile {
        Profile {
            id: 1,
            name: "Jansen Webdesign".into(),
            email: "jan@jansen.nl".into(),
            phone: None,
            address: Some("Kerkstraat 4".into()),
            postal_code: Some("3511 AB".into()),
            city: Some("Utrecht".into()),
            kvk_number: "69241327".into(),
            vat_id: "NL004495445B01".into(),
            iban: "NL91ABNA0417164300".into(),
            bic: None,
            default_payment_term: PaymentTerm::Days30,
            invoice_prefix: String::new(),
            created_at: Utc::now(),
        }
    }

    fn invoice(reverse_charge: bool) -> Invoice {
        Invoice {
            id: 1,
            profile_id: 1,
            client_id: 7,
            number: "2026-0001".into(),
            sequence: 1,
            issue_year: 2026,
            issue_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            payment_term: PaymentTerm::Days30,
            due_date: NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
            status: InvoiceStatus::Draft,
            reverse_charge,
            notes: None,
            subtotal: Decimal::ZERO,
            vat_amount: Decimal::ZERO,
            total: Decimal::ZERO,
            sent_at: None,
            paid_at: None,
            created_at: Utc::now(),
        }
    }

    fn items() -> Vec<InvoiceLineItem> {
        vec![InvoiceLineItem {
            id: 1,
            invoice_id: 1,
            position: 0,
            description: "Website onderhoud".into(),
            quantity: dec!(12),
            unit_price: dec!(95.00),
            vat_rate: VatRate::Standard,
        }]
    }

    #[test]
    fn file_names_stay_in_the_output_directory() {
        assert_eq!(file_stem("JW-2026-0001"), "factuur_JW-2026-0001");
        assert_eq!(file_stem("../../etc/2026-0001"), "factuur_______etc_2026-0001");

        let dir = std::env::temp_dir().join("zzp-manager-file-names");
        let generator = InvoiceGenerator::new(&dir).unwrap();
        let mut invoice = invoice(false);
        invoice.number = "../2026-0001".into();
        let (md, pdf) = generator.generate_invoice(&invoice, &items(), &profile(), &sample_client()).unwrap();
        assert_eq!(md.parent(), Some(dir.as_path()));
        assert_eq!(pdf.parent(), Some(dir.as_path()));
        assert_eq!(md.file_name().and_then(|n| n.to_str()), Some("factuur____2026-0001.md"));
    }

    #[test]
    fn euro_uses_dutch_notation() {
        assert_eq!(euro(dec!(1234567.5)), "€ 1.234.567,50");
        assert_eq!(euro(dec!(0.07)), "€ 0,07");
        assert_eq!(euro(dec!(-121)), "-€ 121,00");
    }

    #[test]
    fn markdown_lists_vat_per_rate() {
        let dir = std::env::temp_dir().join("zzp_invoice_gen_vat");
        let generator = InvoiceGenerator::new(&dir).unwrap();
        let md = generator.generate_markdown(&invoice(false), &items(), &profile(), &sample_client());
        assert!(md.contains("Factuurnummer | 2026-0001"));
        assert!(md.contains("BTW 21% over € 1.140,00: € 239,40"));
        assert!(md.contains("**Totaal: € 1.379,40**"));
        assert!(md.contains("NL91 ABNA 0417 1643 00"));
    }

    #[test]
    fn reverse_charge_is_stated() {
        let dir = std::env::temp_dir().join("zzp_invoice_gen_verlegd");
        let generator = InvoiceGenerator::new(&dir).unwrap();
        let md = generator.generate_markdown(&invoice(true), &items(), &profile(), &sample_client());
        assert!(md.contains("BTW verlegd"));
        assert!(md.contains("**Totaal: € 1.140,00**"));
    }
}
