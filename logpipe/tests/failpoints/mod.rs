mod consumer_test;
