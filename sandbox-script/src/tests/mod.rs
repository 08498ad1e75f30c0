mod lexer_tests;
mod parser_tests;
mod jsx_tests;
