mod merge_test;
mod population_test;
mod postgres_test;
mod reshaping_test;
mod transform_test;
