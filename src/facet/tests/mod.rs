mod test_assembly_basic;
mod test_post_check_basic;
mod test_reconcile_basic;
