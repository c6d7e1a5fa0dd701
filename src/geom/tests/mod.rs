mod test_transform_roundtrip;
