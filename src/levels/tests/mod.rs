mod tests_search;
