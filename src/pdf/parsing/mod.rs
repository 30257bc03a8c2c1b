pub mod pdf_date;
