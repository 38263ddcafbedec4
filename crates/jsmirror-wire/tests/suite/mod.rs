mod fake_vm;
