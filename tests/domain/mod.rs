mod ingestion_payload_test;
