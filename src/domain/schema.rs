//! Read-only library schema the query templates run against.

pub struct ColumnSpec {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub description: &'static str,
}

pub struct TableSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub columns: &'static [ColumnSpec],
}

macro_rules! col {
    ($name:literal, $ty:literal, $desc:literal) => {
        ColumnSpec {
            name: $name,
            sql_type: $ty,
            description: $desc,
        }
    };
}

pub const LIBRARY_TABLES: &[TableSpec] = &[
    TableSpec {
        name: "books",
        description: "bibliographic record, one per title",
        columns: &[
            col!("book_id", "INTEGER", "primary key"),
            col!("title", "VARCHAR", "book title"),
            col!("author_id", "INTEGER", "references authors.author_id"),
            col!("category_id", "INTEGER", "references categories.category_id"),
            col!("publication_year", "INTEGER", "year of publication"),
            col!("isbn", "VARCHAR", "ISBN"),
        ],
    },
    TableSpec {
        name: "authors",
        description: "book authors",
        columns: &[
            col!("author_id", "INTEGER", "primary key"),
            col!("author_name", "VARCHAR", "full name"),
            col!("nationality", "VARCHAR", "nationality"),
        ],
    },
    TableSpec {
        name: "categories",
        description: "subject categories",
        columns: &[
            col!("category_id", "INTEGER", "primary key"),
            col!("category_name", "VARCHAR", "category name"),
        ],
    },
    TableSpec {
        name: "book_copies",
        description: "physical copies of a book",
        columns: &[
            col!("copy_id", "INTEGER", "primary key"),
            col!("book_id", "INTEGER", "references books.book_id"),
            col!("status", "VARCHAR", "available | borrowed | missing"),
            col!("condition", "VARCHAR", "good | fair | poor"),
            col!("call_number", "VARCHAR", "call number"),
            col!("shelf_location", "VARCHAR", "shelf location"),
        ],
    },
    TableSpec {
        name: "students",
        description: "registered borrowers",
        columns: &[
            col!("student_id", "INTEGER", "primary key"),
            col!("matric_number", "VARCHAR", "student number shown to users"),
            col!("full_name", "VARCHAR", "student name"),
            col!("department", "VARCHAR", "department"),
        ],
    },
    TableSpec {
        name: "borrowing_records",
        description: "one row per loan",
        columns: &[
            col!("borrow_id", "INTEGER", "primary key"),
            col!("student_id", "INTEGER", "references students.student_id"),
            col!("copy_id", "INTEGER", "references book_copies.copy_id"),
            col!("borrow_date", "TIMESTAMP", "loan start"),
            col!("due_date", "TIMESTAMP", "loan due"),
            col!("return_date", "TIMESTAMP", "actual return, NULL while on loan"),
            col!("status", "VARCHAR", "borrowed | returned | overdue"),
        ],
    },
];

pub const LIBRARY_RELATIONSHIPS: &[&str] = &[
    "books.author_id -> authors.author_id",
    "books.category_id -> categories.category_id",
    "book_copies.book_id -> books.book_id",
    "borrowing_records.student_id -> students.student_id",
    "borrowing_records.copy_id -> book_copies.copy_id",
];

/// Plain-text schema listing embedded in generation prompts.
pub fn describe_schema() -> String {
    let mut out = String::new();
    for table in LIBRARY_TABLES {
        out.push_str(&format!("{} ({}):\n", table.name, table.description));
        for column in table.columns {
            out.push_str(&format!(
                "  - {} ({}): {}\n",
                column.name, column.sql_type, column.description
            ));
        }
    }
    out.push_str("Relationships:\n");
    for rel in LIBRARY_RELATIONSHIPS {
        out.push_str(&format!("  - {}\n", rel));
    }
    out
}

/// DDL for the development SQLite database.
pub const SQLITE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS authors (
        author_id INTEGER PRIMARY KEY,
        author_name TEXT NOT NULL,
        nationality TEXT
    )",
    "CREATE TABLE IF NOT EXISTS categories (
        category_id INTEGER PRIMARY KEY,
        category_name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS books (
        book_id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        author_id INTEGER NOT NULL REFERENCES authors(author_id),
        category_id INTEGER NOT NULL REFERENCES categories(category_id),
        publication_year INTEGER,
        isbn TEXT
    )",
    "CREATE TABLE IF NOT EXISTS book_copies (
        copy_id INTEGER PRIMARY KEY,
        book_id INTEGER NOT NULL REFERENCES books(book_id),
        status TEXT NOT NULL DEFAULT 'available',
        condition TEXT NOT NULL DEFAULT 'good',
        call_number TEXT,
        shelf_location TEXT
    )",
    "CREATE TABLE IF NOT EXISTS students (
        student_id INTEGER PRIMARY KEY,
        matric_number TEXT NOT NULL UNIQUE,
        full_name TEXT NOT NULL,
        department TEXT
    )",
    "CREATE TABLE IF NOT EXISTS borrowing_records (
        borrow_id INTEGER PRIMARY KEY,
        student_id INTEGER NOT NULL REFERENCES students(student_id),
        copy_id INTEGER NOT NULL REFERENCES book_copies(copy_id),
        borrow_date TEXT NOT NULL,
        due_date TEXT NOT NULL,
        return_date TEXT,
        status TEXT NOT NULL DEFAULT 'borrowed'
    )",
];

/// Demo rows loaded into a fresh development database.
pub const SQLITE_SEED: &[&str] = &[
    "INSERT INTO authors (author_id, author_name, nationality) VALUES
        (1, 'Liu Cixin', 'China'), (2, '鲁迅', 'China'), (3, 'George Orwell', 'UK')",
    "INSERT INTO categories (category_id, category_name) VALUES
        (1, 'Science Fiction'), (2, 'Literature'), (3, 'Fiction')",
    "INSERT INTO books (book_id, title, author_id, category_id, publication_year, isbn) VALUES
        (1, '三体', 1, 1, 2008, '9787536692930'),
        (2, 'The Wandering Earth', 1, 1, 2000, '9781784978518'),
        (3, '呐喊', 2, 2, 1923, '9787020024759'),
        (4, '1984', 3, 3, 1949, '9780451524935')",
    "INSERT INTO book_copies (copy_id, book_id, status, condition, call_number, shelf_location) VALUES
        (1, 1, 'borrowed', 'good', 'I247.5/L1', 'A-01'),
        (2, 1, 'available', 'fair', 'I247.5/L1-2', 'A-01'),
        (3, 2, 'available', 'good', 'I247.5/L2', 'A-02'),
        (4, 3, 'borrowed', 'poor', 'I210/L3', 'B-01'),
        (5, 4, 'available', 'good', 'I561/O1', 'C-03')",
    "INSERT INTO students (student_id, matric_number, full_name, department) VALUES
        (1, 'A1234567B', '张三', 'Physics'), (2, 'B7654321C', 'Li Ming', 'History')",
    "INSERT INTO borrowing_records (borrow_id, student_id, copy_id, borrow_date, due_date, return_date, status) VALUES
        (1, 1, 1, '2024-03-01', '2024-03-15', NULL, 'borrowed'),
        (2, 2, 4, '2024-03-05', '2024-03-19', NULL, 'borrowed'),
        (3, 1, 3, '2024-02-10', '2024-02-24', '2024-02-20', 'returned'),
        (4, 2, 2, '2024-02-12', '2024-02-26', '2024-02-25', 'returned'),
        (5, 1, 2, '2024-03-10', '2024-03-24', '2024-03-20', 'returned')",
];
